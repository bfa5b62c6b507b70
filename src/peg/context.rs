//! Per-parse matching state.
//!
//! One `Context` exists per parse call. It tracks the cursor, the furthest
//! failure position (for diagnostics), the log of rule matches awaiting
//! their deferred actions, and which rules are currently being evaluated
//! (the recursion guard).
//!
//! Backtracking restores the cursor and truncates the match log to the
//! snapshot; the furthest failure position is deliberately never restored,
//! so the final error points at the deepest place matching reached.

use super::error::UserError;
use super::expr::Expr;
use super::grammar::{Capture, Grammar, RuleId};
use super::input::Pos;

/// Snapshot taken before a speculative match.
#[derive(Clone, Copy)]
struct Save {
    pos: Pos,
    matches: usize,
}

pub(crate) struct Context<'i, S> {
    grammar: &'i Grammar<S>,
    input: &'i [char],
    pos: Pos,
    error_pos: Pos,
    matches: Vec<(RuleId, Pos, Pos)>,
    /// Offset at which each rule is currently being evaluated, if it is.
    active: Vec<Option<usize>>,
}

impl<'i, S> Context<'i, S> {
    pub(crate) fn new(grammar: &'i Grammar<S>, input: &'i [char]) -> Self {
        Context {
            grammar,
            input,
            pos: Pos::start(),
            error_pos: Pos::start(),
            matches: Vec::new(),
            active: vec![None; grammar.rule_count()],
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos.offset >= self.input.len()
    }

    pub(crate) fn error_pos(&self) -> Pos {
        self.error_pos
    }

    pub(crate) fn take_matches(&mut self) -> Vec<(RuleId, Pos, Pos)> {
        std::mem::take(&mut self.matches)
    }

    fn save(&self) -> Save {
        Save { pos: self.pos, matches: self.matches.len() }
    }

    fn restore(&mut self, st: Save) {
        self.pos = st.pos;
        self.matches.truncate(st.matches);
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos.offset).copied()
    }

    fn advance(&mut self) {
        self.pos.offset += 1;
        self.pos.col += 1;
    }

    fn next_line(&mut self) {
        self.pos.line += 1;
        self.pos.col = 1;
    }

    fn note_failure(&mut self) {
        if self.pos.offset > self.error_pos.offset {
            self.error_pos = self.pos;
        }
    }

    /// Evaluate one rule invocation.
    ///
    /// Re-entering a rule that is already being evaluated at the same
    /// offset means recursion without consuming anything; that invocation
    /// fails immediately, which terminates left-recursive cycles.
    pub(crate) fn parse_rule(&mut self, id: RuleId, state: &mut S) -> Result<bool, UserError> {
        let old = self.active[id.index()];
        if old == Some(self.pos.offset) {
            return Ok(false);
        }
        self.active[id.index()] = Some(self.pos.offset);

        let grammar = self.grammar;
        let slot = &grammar.rules[id.index()];
        let begin = self.pos;
        let result = self.eval(&slot.expr, state);
        self.active[id.index()] = old;

        let ok = result?;
        if ok && slot.action.is_some() {
            self.matches.push((id, begin, self.pos));
        }
        Ok(ok)
    }

    fn eval(&mut self, expr: &Expr<S>, state: &mut S) -> Result<bool, UserError> {
        match expr {
            Expr::Char(c) => {
                if self.peek() == Some(*c) {
                    self.advance();
                    return Ok(true);
                }
                self.note_failure();
                Ok(false)
            }
            Expr::Str(s) => {
                for &c in s {
                    if self.peek() != Some(c) {
                        self.note_failure();
                        return Ok(false);
                    }
                    self.advance();
                }
                Ok(true)
            }
            Expr::Set(set) => {
                if let Some(c) = self.peek() {
                    if set.contains(c) {
                        self.advance();
                        return Ok(true);
                    }
                }
                self.note_failure();
                Ok(false)
            }
            Expr::Any => {
                if self.peek().is_some() {
                    self.advance();
                    return Ok(true);
                }
                self.note_failure();
                Ok(false)
            }
            Expr::Eof => Ok(self.at_end()),
            Expr::True => Ok(true),
            Expr::False => Ok(false),
            Expr::Rule(id) => self.parse_rule(*id, state),
            Expr::Seq(left, right) => {
                if !self.eval(left, state)? {
                    return Ok(false);
                }
                self.eval(right, state)
            }
            Expr::Choice(left, right) => {
                let st = self.save();
                if self.eval(left, state)? {
                    return Ok(true);
                }
                self.restore(st);
                self.eval(right, state)
            }
            Expr::Repeat { expr, min, max } => {
                let mut count = 0usize;
                while max.map_or(true, |m| count < m) {
                    let st = self.save();
                    if !self.eval(expr, state)? {
                        self.restore(st);
                        break;
                    }
                    count += 1;
                    // An iteration that consumed nothing would repeat
                    // forever; stop after counting it once.
                    if self.pos.offset == st.pos.offset {
                        break;
                    }
                }
                Ok(count >= *min)
            }
            Expr::And(inner) => {
                let st = self.save();
                let ok = self.eval(inner, state)?;
                self.restore(st);
                Ok(ok)
            }
            Expr::Not(inner) => {
                let st = self.save();
                let ok = self.eval(inner, state)?;
                self.restore(st);
                Ok(!ok)
            }
            Expr::Newline(inner) => {
                if !self.eval(inner, state)? {
                    return Ok(false);
                }
                self.next_line();
                Ok(true)
            }
            Expr::User { expr, handler } => {
                let begin = self.pos;
                if !self.eval(expr, state)? {
                    return Ok(false);
                }
                let capture = Capture { begin, end: self.pos, input: self.input };
                handler(&capture, state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::peg::error::ErrorKind;
    use crate::peg::expr::{and_, ch, eof, lit, not_, range, set, user};
    use crate::peg::grammar::Grammar;
    use crate::peg::input::decode;

    fn accepts(g: &Grammar<()>, root: crate::peg::grammar::RuleId, src: &str) -> bool {
        g.matches(&decode(src), root, &mut ()).is_ok()
    }

    #[test]
    fn choice_is_ordered_and_backtracks() {
        let mut g: Grammar<()> = Grammar::new();
        // "ab" | "a", then "c": the first alternative wins where it can.
        let root = g.rule("root", (lit("ab") | lit("a")) >> ch('c') >> eof());
        assert!(accepts(&g, root, "abc"));
        assert!(accepts(&g, root, "ac"));
        assert!(!accepts(&g, root, "ab"));
    }

    #[test]
    fn repetition_is_greedy() {
        let mut g: Grammar<()> = Grammar::new();
        // a* followed by "a" can never match: the star eats every 'a'.
        let root = g.rule("root", ch('a').star() >> ch('a') >> eof());
        assert!(!accepts(&g, root, "aaa"));
    }

    #[test]
    fn lookahead_consumes_nothing() {
        let mut g: Grammar<()> = Grammar::new();
        let root = g.rule(
            "root",
            and_(lit("let")) >> lit("let") >> not_(ch('!')) >> ch(';') >> eof(),
        );
        assert!(accepts(&g, root, "let;"));
        assert!(!accepts(&g, root, "let!"));
    }

    #[test]
    fn repeat_bounds() {
        let mut g: Grammar<()> = Grammar::new();
        let root = g.rule("root", ch('x').plus() >> eof());
        assert!(!accepts(&g, root, ""));
        assert!(accepts(&g, root, "x"));
        assert!(accepts(&g, root, "xxxx"));

        let mut g: Grammar<()> = Grammar::new();
        let root = g.rule("root", ch('x').opt() >> ch('y') >> eof());
        assert!(accepts(&g, root, "y"));
        assert!(accepts(&g, root, "xy"));
        assert!(!accepts(&g, root, "xxy"));
    }

    #[test]
    fn direct_left_recursion_fails_instead_of_hanging() {
        let mut g: Grammar<()> = Grammar::new();
        let e = g.declare("e");
        // e <- e '+' 'n' | 'n'
        g.define(e, (e >> ch('+') >> ch('n')) | ch('n'));
        let root = g.rule("root", e >> eof());
        // The left-recursive alternative fails via the guard; the plain
        // alternative still matches a single item.
        assert!(accepts(&g, root, "n"));
        assert!(!accepts(&g, root, "n+n"));
    }

    #[test]
    fn mutual_recursion_without_progress_terminates() {
        let mut g: Grammar<()> = Grammar::new();
        let a = g.declare("a");
        let b = g.declare("b");
        g.define(a, b | ch('x'));
        g.define(b, a | ch('y'));
        let root = g.rule("root", a >> eof());
        assert!(accepts(&g, root, "x"));
        assert!(accepts(&g, root, "y"));
        assert!(!accepts(&g, root, "z"));
    }

    #[test]
    fn same_rule_at_deeper_offsets_still_recurses() {
        let mut g: Grammar<()> = Grammar::new();
        let item = g.declare("item");
        // item <- '(' item ')' | 'x' : recursion with progress is fine.
        g.define(item, (ch('(') >> item >> ch(')')) | ch('x'));
        let root = g.rule("root", item >> eof());
        assert!(accepts(&g, root, "x"));
        assert!(accepts(&g, root, "((x))"));
        assert!(!accepts(&g, root, "((x)"));
    }

    #[test]
    fn furthest_failure_position_is_reported() {
        let mut g: Grammar<()> = Grammar::new();
        let root = g.rule("root", lit("if ") >> lit("then") >> eof());
        let err = g.matches(&decode("if thex"), root, &mut ()).unwrap_err();
        let raw = err.raw().expect("positioned error");
        assert_eq!(raw.kind, ErrorKind::Syntax);
        // Matching got as far as the 'x'.
        assert_eq!(raw.begin.offset, 6);
    }

    #[test]
    fn actions_run_in_match_order_only_on_success() {
        let mut g: Grammar<Vec<String>> = Grammar::new();
        let word = g.rule("word", range('a', 'z').plus());
        g.action(word, |cap, out| {
            out.push(cap.text());
            Ok(())
        });
        let root = g.rule("root", word >> ch(' ') >> word >> eof());

        let mut out = Vec::new();
        g.parse(&decode("hello world"), root, &mut out).unwrap();
        assert_eq!(out, vec!["hello".to_string(), "world".to_string()]);

        let mut out = Vec::new();
        assert!(g.parse(&decode("hello 123"), root, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn backtracked_matches_are_discarded() {
        let mut g: Grammar<Vec<String>> = Grammar::new();
        let word = g.rule("word", range('a', 'z').plus());
        g.action(word, |cap, out| {
            out.push(cap.text());
            Ok(())
        });
        // First alternative logs a word match, then fails on ';' and is
        // rolled back; only the second alternative's match survives.
        let root = g.rule("root", (word >> ch(';')) | (word >> ch('!')));
        let full = g.rule("full", root >> eof());

        let mut out = Vec::new();
        g.parse(&decode("ok!"), full, &mut out).unwrap();
        assert_eq!(out, vec!["ok".to_string()]);
    }

    #[test]
    fn user_predicate_can_veto_or_abort() {
        let mut g: Grammar<()> = Grammar::new();
        let word = g.rule(
            "word",
            user(range('a', 'z').plus(), |cap, _| Ok(cap.text() != "goto")),
        );
        let root = g.rule("root", word >> eof());
        assert!(accepts(&g, root, "go"));
        assert!(!accepts(&g, root, "goto"));

        let mut g: Grammar<()> = Grammar::new();
        let word = g.rule(
            "word",
            user(range('a', 'z').plus(), |cap, _| {
                Err(crate::peg::error::UserError::new("reserved", cap.begin, cap.end))
            }),
        );
        let root = g.rule("root", word >> eof());
        let err = g.matches(&decode("abc"), root, &mut ()).unwrap_err();
        assert_eq!(err.raw().expect("positioned error").kind, ErrorKind::User(100));
    }

    #[test]
    fn set_and_range_match_single_chars() {
        let mut g: Grammar<()> = Grammar::new();
        let root = g.rule("root", set("+-") >> range('0', '9').plus() >> eof());
        assert!(accepts(&g, root, "+42"));
        assert!(accepts(&g, root, "-7"));
        assert!(!accepts(&g, root, "42"));
    }

    #[test]
    fn nullable_repetition_terminates() {
        let mut g: Grammar<()> = Grammar::new();
        let root = g.rule("root", crate::peg::expr::true_().star() >> eof());
        assert!(accepts(&g, root, ""));
    }
}
