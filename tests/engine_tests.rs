// tests/engine_tests.rs
//
// Exercises the PEG engine directly, without the language grammar: matching
// semantics, furthest-failure reporting, and deferred action replay.

use muscript::peg::{
    decode, range, set, user, ActionError, ErrorKind, Expr, Grammar, ParseFailure, UserError,
};

type Log = Vec<String>;

fn digit() -> Expr<Log> {
    range('0', '9')
}

fn run(g: &Grammar<Log>, root: muscript::peg::RuleId, source: &str) -> Result<Log, ParseFailure> {
    let input = decode(source);
    let mut log = Log::new();
    g.parse(&input, root, &mut log)?;
    Ok(log)
}

fn raw_of(failure: ParseFailure) -> muscript::peg::RawError {
    match failure {
        ParseFailure::Raw(raw) => raw,
        ParseFailure::Internal(msg) => panic!("unexpected internal failure: {msg}"),
    }
}

// ---
// Matching
// ---

#[test]
fn test_sequence_matches_in_order() {
    let mut g = Grammar::<Log>::new();
    let sum = g.rule("sum", digit() >> '+' >> digit());
    assert!(run(&g, sum, "1+2").is_ok());
    assert!(run(&g, sum, "1-2").is_err());
}

#[test]
fn test_choice_is_ordered_and_backtracks() {
    let mut g = Grammar::<Log>::new();
    let word = g.rule("word", Expr::from("interest") | "inter" | "in");
    assert!(run(&g, word, "interest").is_ok());
    assert!(run(&g, word, "inter").is_ok());
    assert!(run(&g, word, "in").is_ok());
}

#[test]
fn test_repeat_stops_at_first_mismatch() {
    let mut g = Grammar::<Log>::new();
    let digits = g.rule("digits", digit().plus());
    assert!(run(&g, digits, "123").is_ok());

    // The prefix matches; the report points at the first unconsumable char.
    let raw = raw_of(run(&g, digits, "123abc").unwrap_err());
    assert_eq!(raw.kind, ErrorKind::Syntax);
    assert_eq!(raw.begin.offset, 3);
}

#[test]
fn test_failure_position_is_the_furthest_reached() {
    let mut g = Grammar::<Log>::new();
    // Both alternatives get two chars in before dying; backtracking must
    // not roll the report back to the start of the choice.
    let word = g.rule("word", Expr::from("abc") | "abd");
    let raw = raw_of(run(&g, word, "abx").unwrap_err());
    assert_eq!(raw.begin.offset, 2);
}

#[test]
fn test_prefix_ending_at_eof_reports_invalid_eof() {
    let mut g = Grammar::<Log>::new();
    let pairs = g.rule("pairs", Expr::from("ab").star());
    // "ab" then a dangling "a": every failure sits at the end of input.
    let raw = raw_of(run(&g, pairs, "aba").unwrap_err());
    assert_eq!(raw.kind, ErrorKind::InvalidEof);
    assert_eq!(raw.kind.code(), 2);
}

// ---
// Deferred actions
// ---

fn record(g: &mut Grammar<Log>, id: muscript::peg::RuleId) {
    let name = g.rule_name(id).to_string();
    g.action(id, move |cap, log: &mut Log| {
        log.push(format!("{name}:{}", cap.text()));
        Ok(())
    });
}

#[test]
fn test_actions_replay_inner_before_outer() {
    let mut g = Grammar::<Log>::new();
    let num = g.rule("num", digit().plus());
    record(&mut g, num);
    let sum = g.rule("sum", num >> Expr::from('+') >> num);
    record(&mut g, sum);

    let log = run(&g, sum, "12+34").unwrap();
    assert_eq!(log, ["num:12", "num:34", "sum:12+34"]);
}

#[test]
fn test_failed_parse_runs_no_actions() {
    let mut g = Grammar::<Log>::new();
    let num = g.rule("num", digit().plus());
    record(&mut g, num);
    let sum = g.rule("sum", num >> Expr::from('+') >> num);

    assert!(run(&g, sum, "12+").is_err());
    let input = decode("12+");
    let mut log = Log::new();
    let _ = g.parse(&input, sum, &mut log);
    assert!(log.is_empty());
}

#[test]
fn test_action_user_error_aborts_the_replay() {
    let mut g = Grammar::<Log>::new();
    let num = g.rule("num", digit().plus());
    g.action(num, |cap, _log: &mut Log| {
        if cap.text() == "13" {
            return Err(ActionError::User(UserError::new(
                "unlucky number",
                cap.begin,
                cap.end,
            )));
        }
        Ok(())
    });

    assert!(run(&g, num, "12").is_ok());
    let raw = raw_of(run(&g, num, "13").unwrap_err());
    assert_eq!(raw.kind, ErrorKind::User(100));
    assert_eq!(raw.message, "unlucky number");
}

// ---
// Stateful handlers
// ---

#[test]
fn test_user_handler_can_veto_a_match() {
    let mut g = Grammar::<Log>::new();
    // Accept a word only while the log is empty; vetoes are plain match
    // failures, so the choice falls through to the digit branch.
    let guarded = user(
        set("abcdefghijklmnopqrstuvwxyz").plus(),
        |_cap, log: &mut Log| Ok(log.is_empty()),
    );
    let item = g.rule("item", guarded | digit().plus());

    let mut empty = Log::new();
    assert!(g.parse(&decode("hello"), item, &mut empty).is_ok());

    let mut busy = vec!["seen".to_string()];
    assert!(g.parse(&decode("hello"), item, &mut busy).is_err());
    assert!(g.parse(&decode("42"), item, &mut busy).is_ok());
}
