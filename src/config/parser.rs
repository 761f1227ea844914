//! Recursive-descent parser with one-token lookahead (spec §4.1).

use super::ast::{CommandAttrs, Config, Group};
use super::error::ParseError;
use super::lexer::{Lexer, Token};
use crate::model::{Action, IdentType, Script, WaitFor};

const CMD_ATTRIBUTES: &[&str] = &["exec", "host", "nickname", "auto_respawn"];

type Pos = (usize, usize, String);

/// Parses `source` into a [`Config`] tree.
pub fn parse(source: &str) -> Result<Config, ParseError> {
    Parser::new(source)?.parse_config()
}

struct Parser {
    lexer: Lexer,
    cur: Token,
    cur_pos: Pos,
    next: Token,
    next_pos: Pos,
}

fn read_skipping_comments(lexer: &mut Lexer) -> Result<(Token, Pos), ParseError> {
    loop {
        let tok = lexer.next_token()?;
        let pos = (lexer.line_num(), lexer.tok_pos, lexer.line_text());
        if matches!(tok, Token::Comment(_)) {
            continue;
        }
        return Ok((tok, pos));
    }
}

impl Parser {
    fn new(source: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let (next, next_pos) = read_skipping_comments(&mut lexer)?;
        Ok(Parser {
            lexer,
            cur: Token::Eof,
            cur_pos: (0, 0, String::new()),
            next,
            next_pos,
        })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        let (tok, pos) = read_skipping_comments(&mut self.lexer)?;
        self.cur = std::mem::replace(&mut self.next, tok);
        self.cur_pos = std::mem::replace(&mut self.next_pos, pos);
        Ok(())
    }

    fn fail(&self, msg: impl Into<String>) -> ParseError {
        let (line, col, text) = self.cur_pos.clone();
        ParseError::new(line, col, text, self.cur.display_value(), msg)
    }

    fn fail_next(&self, msg: impl Into<String>) -> ParseError {
        let (line, col, text) = self.next_pos.clone();
        ParseError::new(line, col, text, self.next.display_value(), msg)
    }

    fn eat_simple(&mut self, want: &Token) -> Result<bool, ParseError> {
        if &self.next == want {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_simple_or_fail(&mut self, want: &Token, msg: &str) -> Result<(), ParseError> {
        if self.eat_simple(want)? {
            Ok(())
        } else {
            Err(self.fail_next(msg))
        }
    }

    fn eat_identifier(&mut self) -> Result<Option<String>, ParseError> {
        if let Token::Identifier(s) = &self.next {
            let s = s.clone();
            self.advance()?;
            Ok(Some(s))
        } else {
            Ok(None)
        }
    }

    fn eat_identifier_or_fail(&mut self, msg: &str) -> Result<String, ParseError> {
        self.eat_identifier()?.ok_or_else(|| self.fail_next(msg))
    }

    fn eat_identifier_one_of(&mut self, valid: &[&str]) -> Result<String, ParseError> {
        let msg = format!("Expected one of {valid:?}");
        let got = self.eat_identifier_or_fail(&msg)?;
        if !valid.contains(&got.as_str()) {
            return Err(self.fail(msg));
        }
        Ok(got)
    }

    fn expect_identifier(&mut self, want: &str) -> Result<(), ParseError> {
        let msg = format!("Expected '{want}'");
        let got = self.eat_identifier_or_fail(&msg)?;
        if got != want {
            return Err(self.fail(msg));
        }
        Ok(())
    }

    fn eat_string(&mut self) -> Result<Option<String>, ParseError> {
        if let Token::String(s) = &self.next {
            let s = s.clone();
            self.advance()?;
            Ok(Some(s))
        } else {
            Ok(None)
        }
    }

    fn eat_string_or_fail(&mut self) -> Result<String, ParseError> {
        self.eat_string()?
            .ok_or_else(|| self.fail_next("Expected string literal"))
    }

    fn eat_string_one_of(&mut self, valid: &[&str]) -> Result<String, ParseError> {
        let got = self.eat_string_or_fail()?;
        if !valid.contains(&got.as_str()) {
            return Err(self.fail(format!("Expected one of {valid:?}")));
        }
        Ok(got)
    }

    fn eat_integer_or_fail(&mut self) -> Result<u64, ParseError> {
        if let Token::Integer(n) = self.next {
            self.advance()?;
            Ok(n)
        } else {
            Err(self.fail_next("Expected integer constant"))
        }
    }

    fn parse_command(&mut self) -> Result<CommandAttrs, ParseError> {
        let mut attrs = CommandAttrs::default();
        let mut has_nickname = false;
        if let Some(nick) = self.eat_string()? {
            attrs.nickname = nick;
            has_nickname = true;
        }
        self.eat_simple_or_fail(&Token::OpenBrace, "Expected '{'")?;
        while let Some(name) = self.eat_identifier()? {
            if !CMD_ATTRIBUTES.contains(&name.as_str()) {
                return Err(self.fail(format!("Unrecognized attribute {name}")));
            }
            self.eat_simple_or_fail(&Token::Assign, "Expected '='")?;
            let val = self.eat_string_or_fail()?;
            self.eat_simple_or_fail(&Token::Semicolon, "Expected ';'")?;
            match name.as_str() {
                "exec" => attrs.exec = val,
                "host" => attrs.host = val,
                "nickname" => {
                    if has_nickname {
                        return Err(self.fail(format!(
                            "Command already has a nickname {}",
                            attrs.nickname
                        )));
                    }
                    attrs.nickname = val;
                    has_nickname = true;
                }
                "auto_respawn" => {
                    attrs.auto_respawn = matches!(val.to_lowercase().as_str(), "true" | "yes")
                }
                _ => unreachable!(),
            }
        }
        self.eat_simple_or_fail(&Token::CloseBrace, "Expected '}'")?;
        if attrs.exec.is_empty() {
            return Err(self.fail("Invalid command defined -- no executable specified"));
        }
        if attrs.host.is_empty() {
            return Err(self.fail("Invalid command defined -- no host specified"));
        }
        Ok(attrs)
    }

    fn parse_command_list(&mut self) -> Result<Vec<CommandAttrs>, ParseError> {
        let mut cmds = Vec::new();
        loop {
            let is_cmd = matches!(&self.next, Token::Identifier(s) if s == "cmd");
            if !is_cmd {
                break;
            }
            self.advance()?;
            cmds.push(self.parse_command()?);
        }
        Ok(cmds)
    }

    fn parse_group(&mut self) -> Result<Group, ParseError> {
        let name = self.eat_string_or_fail()?;
        self.eat_simple_or_fail(&Token::OpenBrace, "Expected '{'")?;
        let commands = self.parse_command_list()?;
        self.eat_simple_or_fail(&Token::CloseBrace, "Expected '}'")?;
        Ok(Group { name, commands })
    }

    fn parse_ident_spec(&mut self) -> Result<(IdentType, Option<String>), ParseError> {
        let kind = self.eat_identifier_one_of(&["everything", "cmd", "group"])?;
        match kind.as_str() {
            "everything" => Ok((IdentType::Everything, None)),
            "cmd" => Ok((IdentType::Cmd, Some(self.eat_string_or_fail()?))),
            "group" => Ok((IdentType::Group, Some(self.eat_string_or_fail()?))),
            _ => unreachable!(),
        }
    }

    fn parse_start_stop_restart(&mut self, action_type: &str) -> Result<Action, ParseError> {
        let (ident_type, ident) = self.parse_ident_spec()?;
        let wait = if self.eat_simple(&Token::Semicolon)? {
            None
        } else {
            self.expect_identifier("wait")?;
            let status = self.eat_string_one_of(&["running", "stopped"])?;
            self.eat_simple_or_fail(&Token::Semicolon, "Expected ';'")?;
            Some(if status == "running" {
                WaitFor::Running
            } else {
                WaitFor::Stopped
            })
        };
        Ok(match action_type {
            "start" => Action::Start {
                ident_type,
                ident,
                wait,
            },
            "stop" => Action::Stop {
                ident_type,
                ident,
                wait,
            },
            "restart" => Action::Restart {
                ident_type,
                ident,
                wait,
            },
            _ => unreachable!(),
        })
    }

    fn parse_wait_action(&mut self) -> Result<Action, ParseError> {
        let wait_type = self.eat_identifier_one_of(&["ms", "cmd", "group"])?;
        if wait_type == "ms" {
            let delay_ms = self.eat_integer_or_fail()?;
            self.eat_simple_or_fail(&Token::Semicolon, "Expected ';'")?;
            return Ok(Action::WaitMs(delay_ms));
        }
        let ident = self.eat_string_or_fail()?;
        self.expect_identifier("status")?;
        let status = self.eat_string_one_of(&["running", "stopped"])?;
        self.eat_simple_or_fail(&Token::Semicolon, "Expected ';'")?;
        let ident_type = if wait_type == "cmd" {
            IdentType::Cmd
        } else {
            IdentType::Group
        };
        let wait = if status == "running" {
            WaitFor::Running
        } else {
            WaitFor::Stopped
        };
        Ok(Action::WaitStatus {
            ident_type,
            ident,
            wait,
        })
    }

    fn parse_run_script(&mut self) -> Result<Action, ParseError> {
        let name = self.eat_string_or_fail()?;
        self.eat_simple_or_fail(&Token::Semicolon, "Expected ';'")?;
        Ok(Action::RunScript(name))
    }

    fn parse_script_action_list(&mut self) -> Result<Vec<Action>, ParseError> {
        self.eat_simple_or_fail(&Token::OpenBrace, "Expected '{'")?;
        let mut actions = Vec::new();
        while let Some(kw) = self.eat_identifier()? {
            let action = match kw.as_str() {
                "start" | "stop" | "restart" => self.parse_start_stop_restart(&kw)?,
                "wait" => self.parse_wait_action()?,
                "run_script" => self.parse_run_script()?,
                _ => return Err(self.fail(format!("Unexpected token {kw}"))),
            };
            actions.push(action);
        }
        self.eat_simple_or_fail(&Token::CloseBrace, "Unexpected token")?;
        Ok(actions)
    }

    fn parse_script(&mut self) -> Result<Script, ParseError> {
        let name = self.eat_string_or_fail()?;
        let actions = self.parse_script_action_list()?;
        Ok(Script { name, actions })
    }

    fn parse_config(&mut self) -> Result<Config, ParseError> {
        let mut config = Config::new();
        loop {
            if self.eat_simple(&Token::Eof)? {
                break;
            }
            let kw = self.eat_identifier_or_fail("Expected 'cmd', 'group', or 'script'")?;
            match kw.as_str() {
                "cmd" => {
                    let cmd = self.parse_command()?;
                    push_top_level(&mut config, cmd);
                }
                "group" => {
                    let group = self.parse_group()?;
                    if group.name.is_empty() {
                        for cmd in group.commands {
                            push_top_level(&mut config, cmd);
                        }
                    } else if config.groups.iter().any(|g| g.name == group.name) {
                        return Err(self.fail(format!("Duplicate group \"{}\"", group.name)));
                    } else {
                        config.groups.push(group);
                    }
                }
                "script" => {
                    let script = self.parse_script()?;
                    if config.scripts.iter().any(|s| s.name == script.name) {
                        return Err(self.fail(format!("Duplicate script \"{}\"", script.name)));
                    }
                    config.scripts.push(script);
                }
                _ => return Err(self.fail("Expected 'cmd', 'group', or 'script'")),
            }
        }
        Ok(config)
    }
}

fn push_top_level(config: &mut Config, cmd: CommandAttrs) {
    if let Some(g) = config.groups.iter_mut().find(|g| g.name.is_empty()) {
        g.commands.push(cmd);
    } else {
        config.groups.push(Group {
            name: String::new(),
            commands: vec![cmd],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_command() {
        let cfg = parse(r#"cmd { exec = "/bin/true"; host = "localhost"; }"#).unwrap();
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].name, "");
        assert_eq!(cfg.groups[0].commands[0].exec, "/bin/true");
        assert_eq!(cfg.groups[0].commands[0].host, "localhost");
    }

    #[test]
    fn missing_exec_is_an_error() {
        let err = parse(r#"cmd { host = "localhost"; }"#).unwrap_err();
        assert!(err.msg.contains("no executable"));
    }

    #[test]
    fn missing_host_is_an_error() {
        let err = parse(r#"cmd { exec = "/bin/true"; }"#).unwrap_err();
        assert!(err.msg.contains("no host"));
    }

    #[test]
    fn duplicate_nickname_is_an_error() {
        let src = r#"cmd "a" { exec = "/bin/true"; host = "h"; nickname = "b"; }"#;
        let err = parse(src).unwrap_err();
        assert!(err.msg.contains("already has a nickname"));
    }

    #[test]
    fn nested_group_and_script() {
        let src = r#"
            group "svc" {
                cmd "web" { exec = "/bin/web"; host = "h1"; auto_respawn = true; }
            }
            script "deploy" {
                start cmd "web" wait "running";
                wait ms 50;
                stop group "svc" wait "stopped";
                run_script "cleanup";
            }
        "#;
        let cfg = parse(src).unwrap();
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].name, "svc");
        assert!(cfg.groups[0].commands[0].auto_respawn);
        assert_eq!(cfg.scripts.len(), 1);
        assert_eq!(cfg.scripts[0].actions.len(), 4);
    }

    #[test]
    fn comments_are_ignored_by_the_parser() {
        let src = "# a leading comment\ncmd { exec = \"/bin/true\"; host = \"h\"; } # trailing";
        let cfg = parse(src).unwrap();
        assert_eq!(cfg.groups[0].commands[0].exec, "/bin/true");
    }

    #[test]
    fn unrecognized_attribute_is_an_error() {
        let src = r#"cmd { exec = "/bin/true"; host = "h"; bogus = "x"; }"#;
        assert!(parse(src).is_err());
    }

    #[test]
    fn group_empty_name_merges_into_top_level() {
        let src = r#"
            group "" {
                cmd { exec = "/bin/a"; host = "h"; }
            }
            cmd { exec = "/bin/b"; host = "h"; }
        "#;
        let cfg = parse(src).unwrap();
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].commands.len(), 2);
    }
}
