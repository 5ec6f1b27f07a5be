use super::Parser;
use crate::action::NextExpression;
use crate::error::ParseError;
use crate::lexer::Token;

const KEYWORDS: [&str; 3] = ["start", "readonly", "detach"];

impl<'a> Parser<'a> {
    /// `end`, `a | b | ...` or `x:a | y:b | ...`.
    pub(super) fn parse_clause(&mut self) -> Result<NextExpression, ParseError> {
        match self.peek().clone() {
            Token::Word(w) if w == "end" => {
                self.advance();
                Ok(NextExpression::End)
            }
            Token::Word(w) if !KEYWORDS.contains(&w.as_str()) => {
                self.advance();
                let mut targets = vec![self.qualify(&w)];
                while self.peek() == &Token::Pipe {
                    self.advance();
                    match self.peek().clone() {
                        Token::Word(w) if w != "end" && !KEYWORDS.contains(&w.as_str()) => {
                            targets.push(self.qualify(&w));
                            self.advance();
                        }
                        _ => return Err(self.err("expected action after '|'")),
                    }
                }
                if targets.len() == 1 {
                    Ok(NextExpression::Single(targets.remove(0)))
                } else {
                    Ok(NextExpression::Fork(targets))
                }
            }
            Token::Branch(branch, target) => {
                self.advance();
                let mut arms = vec![(branch, self.qualify(&target))];
                while self.peek() == &Token::Pipe {
                    self.advance();
                    let Token::Branch(branch, target) = self.peek().clone() else {
                        return Err(self.err("expected 'branch:action' after '|'"));
                    };
                    if arms.iter().any(|(b, _)| *b == branch) {
                        return Err(self.err(format!("duplicate branch '{}'", branch)));
                    }
                    arms.push((branch, self.qualify(&target)));
                    self.advance();
                }
                Ok(NextExpression::Split(arms))
            }
            _ => Err(self.err("empty next clause")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::action::NextExpression;
    use crate::parser::parse_action;

    #[test]
    fn pipe_requires_a_following_action() {
        let err = parse_action("> a |", "", "x").unwrap_err();
        assert_eq!(err.message, "expected action after '|'");
        assert_eq!(err.offset, 5);

        let err = parse_action("> a | y:b", "", "x").unwrap_err();
        assert_eq!(err.message, "expected action after '|'");

        let err = parse_action("> y:a | b", "", "x").unwrap_err();
        assert_eq!(err.message, "expected 'branch:action' after '|'");
    }

    #[test]
    fn duplicate_branch_names_are_rejected() {
        let err = parse_action("> y:a | y:b", "", "x").unwrap_err();
        assert_eq!(err.message, "duplicate branch 'y'");
        assert_eq!(err.remainder(), "y:b");
    }

    #[test]
    fn keywords_are_not_targets() {
        let err = parse_action("> start", "", "x").unwrap_err();
        assert_eq!(err.message, "empty next clause");
    }

    #[test]
    fn clause_stops_at_next_item() {
        let d = parse_action("> a detach", "", "x").unwrap();
        assert_eq!(d.next, NextExpression::Single("a".into()));
        assert!(d.flags.detach);
    }
}
