//! Parser for the action expression mini-language.
//!
//! ```text
//! [Owner::name] start readonly detach >| #tag #tag= #tag=value
//!     ( end | > clause | +> clause -> clause | N> clause ... | name> clause ... )
//! clause := end | action ('|' action)* | branch:action ('|' branch:action)*
//! ```
//!
//! Flags, the join marker and each transition style may appear at most once, in
//! any order; tags may repeat. The mutually exclusive items are tracked in a
//! bit set so that mixing decision styles is rejected at the offending token.
use crate::action::{qualify, ActionDescriptor, ActionFlags, NextExpression, IF_FALSE, IF_TRUE};
use crate::error::ParseError;
use crate::lexer::{self, Spanned, Token};
use crate::tags::Tags;

mod clause;

const START: u16 = 1 << 0;
const READONLY: u16 = 1 << 1;
const DETACH: u16 = 1 << 2;
const JOIN: u16 = 1 << 3;
const END: u16 = 1 << 4;
const GOTO: u16 = 1 << 5;
const IF_TRUE_ARM: u16 = 1 << 6;
const IF_FALSE_ARM: u16 = 1 << 7;
const INT_ARMS: u16 = 1 << 8;
const NAME_ARMS: u16 = 1 << 9;

const TRANSITION: u16 = END | GOTO;
const DECISION: u16 = IF_TRUE_ARM | IF_FALSE_ARM | INT_ARMS | NAME_ARMS;

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    owner: &'a str,
    seen: u16,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, owner: &'a str) -> Result<Self, ParseError> {
        Ok(Parser {
            src,
            tokens: lexer::lex(src)?,
            pos: 0,
            owner,
            seen: 0,
        })
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn offset(&self) -> usize {
        self.cur().offset
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(self.src, self.offset(), msg)
    }

    fn unexpected(&self) -> ParseError {
        self.err(format!("unexpected token '{}'", self.peek().describe()))
    }

    fn qualify(&self, name: &str) -> String {
        qualify(self.owner, name)
    }

    /// Record `bit` as seen unless any of `conflicts` already is.
    fn claim(&mut self, bit: u16, conflicts: u16) -> Result<(), ParseError> {
        if self.seen & conflicts != 0 {
            return Err(self.unexpected());
        }
        self.seen |= bit;
        Ok(())
    }

    fn check_identity(&mut self, name: &str) -> Result<(), ParseError> {
        let Token::Identity(ident) = self.peek().clone() else {
            return Ok(());
        };
        let expected = self.qualify(name);
        let matches = if ident.contains("::") {
            ident == expected
        } else {
            ident == name
        };
        if !matches {
            return Err(self.err(format!(
                "action identity '{}' does not match '{}'",
                ident, expected
            )));
        }
        self.advance();
        Ok(())
    }

    fn parse_action(mut self, name: &str) -> Result<ActionDescriptor, ParseError> {
        self.check_identity(name)?;

        let mut flags = ActionFlags::default();
        let mut tags = Tags::new();
        let mut next = None;
        let mut arms: Vec<(String, NextExpression)> = Vec::new();

        loop {
            match self.peek().clone() {
                Token::Eof => break,
                Token::Word(w) => match w.as_str() {
                    "start" => {
                        self.claim(START, START)?;
                        flags.start = true;
                        self.advance();
                    }
                    "readonly" => {
                        self.claim(READONLY, READONLY)?;
                        flags.readonly = true;
                        self.advance();
                    }
                    "detach" => {
                        self.claim(DETACH, DETACH)?;
                        flags.detach = true;
                        self.advance();
                    }
                    "end" => {
                        self.claim(END, TRANSITION | DECISION)?;
                        next = Some(NextExpression::End);
                        self.advance();
                    }
                    _ => return Err(self.unexpected()),
                },
                Token::Join => {
                    self.claim(JOIN, JOIN)?;
                    flags.join = true;
                    self.advance();
                }
                Token::Goto => {
                    self.claim(GOTO, TRANSITION | DECISION)?;
                    self.advance();
                    next = Some(self.parse_clause()?);
                }
                Token::IfTrue => {
                    self.claim(IF_TRUE_ARM, TRANSITION | IF_TRUE_ARM | INT_ARMS | NAME_ARMS)?;
                    self.advance();
                    arms.push((IF_TRUE.to_string(), self.parse_clause()?));
                }
                Token::IfFalse => {
                    self.claim(IF_FALSE_ARM, TRANSITION | IF_FALSE_ARM | INT_ARMS | NAME_ARMS)?;
                    self.advance();
                    arms.push((IF_FALSE.to_string(), self.parse_clause()?));
                }
                Token::IntArm(n) => {
                    self.claim(INT_ARMS, TRANSITION | IF_TRUE_ARM | IF_FALSE_ARM | NAME_ARMS)?;
                    self.push_arm(&mut arms, n.to_string())?;
                }
                Token::NameArm(key) => {
                    self.claim(NAME_ARMS, TRANSITION | IF_TRUE_ARM | IF_FALSE_ARM | INT_ARMS)?;
                    self.push_arm(&mut arms, key)?;
                }
                Token::Tag(tag, value) => {
                    if tags.contains_key(&tag) {
                        return Err(self.err(format!("duplicate tag '#{}'", tag)));
                    }
                    tags.insert(tag, value);
                    self.advance();
                }
                Token::Identity(_) => {
                    return Err(self.err("action identity must come first"));
                }
                Token::Branch(..) | Token::Pipe => return Err(self.unexpected()),
            }
        }

        // Boolean decisions need both arms; integer and named arms have no minimum.
        let booleans = self.seen & (IF_TRUE_ARM | IF_FALSE_ARM);
        if booleans == IF_TRUE_ARM {
            return Err(self.err("expected if false token '->'"));
        }
        if booleans == IF_FALSE_ARM {
            return Err(self.err("expected if true token '+>'"));
        }

        let next = match next {
            Some(next) => next,
            None if !arms.is_empty() => NextExpression::Decision(arms),
            None => return Err(self.err("expected 'end', '>' or a decision")),
        };

        Ok(ActionDescriptor {
            owner: self.owner.to_string(),
            name: name.to_string(),
            flags,
            next,
            tags,
        })
    }

    fn push_arm(
        &mut self,
        arms: &mut Vec<(String, NextExpression)>,
        key: String,
    ) -> Result<(), ParseError> {
        if arms.iter().any(|(k, _)| *k == key) {
            return Err(self.err(format!("duplicate decision key '{}'", key)));
        }
        self.advance();
        let clause = self.parse_clause()?;
        arms.push((key, clause));
        Ok(())
    }
}

/// Parse the expression `src` of the action `name` owned by `owner`.
///
/// Bare successor names are qualified with `owner`.
pub fn parse_action(src: &str, owner: &str, name: &str) -> Result<ActionDescriptor, ParseError> {
    Parser::new(src, owner)?.parse_action(name)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagValue;

    fn parse(src: &str) -> Result<ActionDescriptor, ParseError> {
        parse_action(src, "Shop", "pay")
    }

    fn normalize(src: &str) -> String {
        src.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn flags_tags_and_single_successor() {
        let d = parse("start readonly detach #lang=en #web #draft= > ship").unwrap();
        assert!(d.flags.start && d.flags.readonly && d.flags.detach);
        assert!(!d.flags.join);
        assert_eq!(d.next, NextExpression::Single("Shop::ship".into()));
        assert_eq!(d.tags.get("lang"), Some(&TagValue::Exact("en".into())));
        assert_eq!(d.tags.get("web"), Some(&TagValue::Wildcard));
        assert_eq!(d.tags.get("draft"), Some(&TagValue::Empty));
        assert_eq!(d.key(), "Shop::pay");
    }

    #[test]
    fn order_of_items_is_free() {
        let a = parse("> ship #lang=en start").unwrap();
        let b = parse("start #lang=en > ship").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fork_and_split_clauses() {
        let d = parse("> a | Bank::b").unwrap();
        assert_eq!(
            d.next,
            NextExpression::Fork(vec!["Shop::a".into(), "Bank::b".into()])
        );
        let d = parse("> next:a | prev:b").unwrap();
        assert_eq!(
            d.next,
            NextExpression::Split(vec![
                ("next".into(), "Shop::a".into()),
                ("prev".into(), "Shop::b".into()),
            ])
        );
    }

    #[test]
    fn boolean_decision() {
        let d = parse(">| -> end +> retry").unwrap();
        assert!(d.flags.join);
        assert_eq!(
            d.next,
            NextExpression::Decision(vec![
                ("-".into(), NextExpression::End),
                ("+".into(), NextExpression::Single("Shop::retry".into())),
            ])
        );
    }

    #[test]
    fn integer_and_named_decisions() {
        let d = parse("1> a 2> b | c").unwrap();
        assert_eq!(
            d.next,
            NextExpression::Decision(vec![
                ("1".into(), NextExpression::Single("Shop::a".into())),
                (
                    "2".into(),
                    NextExpression::Fork(vec!["Shop::b".into(), "Shop::c".into()])
                ),
            ])
        );
        let d = parse("ok> end failed> x:a | y:b").unwrap();
        match d.next {
            NextExpression::Decision(arms) => {
                assert_eq!(arms[0], ("ok".into(), NextExpression::End));
                assert!(matches!(arms[1].1, NextExpression::Split(_)));
            }
            other => panic!("expected decision, got {:?}", other),
        }
    }

    #[test]
    fn single_integer_arm_is_accepted() {
        // Integer and named arms impose no minimum arm count.
        let d = parse("7> a").unwrap();
        assert_eq!(
            d.next,
            NextExpression::Decision(vec![("7".into(), NextExpression::Single("Shop::a".into()))])
        );
        assert!(parse("only> a").is_ok());
    }

    #[test]
    fn unpaired_boolean_arm_fails_at_end_of_input() {
        let err = parse("+> a").unwrap_err();
        assert_eq!(err.message, "expected if false token '->'");
        assert_eq!(err.offset, 4);
        assert_eq!(err.remainder(), "");

        let err = parse("-> a start").unwrap_err();
        assert_eq!(err.message, "expected if true token '+>'");
        assert_eq!(err.offset, 10);
    }

    #[test]
    fn mixing_decision_styles_is_rejected() {
        let err = parse("+> a 1> b").unwrap_err();
        assert_eq!(err.message, "unexpected token '1>'");
        assert_eq!(err.offset, 5);

        let err = parse("1> a ok> b").unwrap_err();
        assert_eq!(err.message, "unexpected token 'ok>'");

        let err = parse("> a +> b -> c").unwrap_err();
        assert_eq!(err.message, "unexpected token '+>'");

        let err = parse("end > a").unwrap_err();
        assert_eq!(err.message, "unexpected token '>'");
    }

    #[test]
    fn repeated_items_are_rejected() {
        assert_eq!(
            parse("start start end").unwrap_err().message,
            "unexpected token 'start'"
        );
        assert_eq!(
            parse(">| >| end").unwrap_err().message,
            "unexpected token '>|'"
        );
        assert_eq!(
            parse("1> a 1> b").unwrap_err().message,
            "duplicate decision key '1'"
        );
        assert_eq!(
            parse("#a #a= end").unwrap_err().message,
            "duplicate tag '#a'"
        );
    }

    #[test]
    fn missing_transition_and_empty_clause() {
        assert_eq!(
            parse("start").unwrap_err().message,
            "expected 'end', '>' or a decision"
        );
        let err = parse("start > #x").unwrap_err();
        assert_eq!(err.message, "empty next clause");
        assert_eq!(err.consumed(), "start > ");
        assert_eq!(err.remainder(), "#x");
    }

    #[test]
    fn identity_must_match() {
        assert!(parse("[pay] end").is_ok());
        assert!(parse("[Shop::pay] end").is_ok());
        let err = parse("[Shop::refund] end").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(err.message.contains("does not match 'Shop::pay'"));
        let err = parse("end [pay]").unwrap_err();
        assert_eq!(err.message, "action identity must come first");
    }

    #[test]
    fn unqualified_owner_keeps_bare_names() {
        let d = parse_action("> go", "", "start_here").unwrap();
        assert_eq!(d.next, NextExpression::Single("go".into()));
        assert_eq!(d.key(), "start_here");
    }

    #[test]
    fn render_round_trips_every_form() {
        let forms = [
            "end",
            "start > go",
            "start readonly detach >| #a #b= #c=x end",
            "> a | b | Bank::c",
            "> next:a | prev:b",
            "+> a -> end",
            ">| +> a | b -> x:c | y:d",
            "1> a 2> end 10> b",
            "ok> a failed> end",
            "start #lang=en > Other::go",
        ];
        for form in forms {
            let d = parse(form).unwrap_or_else(|e| panic!("{}: {}", form, e));
            assert_eq!(d.to_string(), normalize(form), "round trip of '{}'", form);
            let again = parse(&d.to_string()).unwrap();
            assert_eq!(again, d);
        }
    }

    #[test]
    fn doc_comment_embedding() {
        let src = "\n * start\n * #lang=fr\n * > go\n ";
        let d = parse(src).unwrap();
        assert_eq!(d.to_string(), "start #lang=fr > go");
    }
}
