//! Canonical text serializer: the inverse of [`super::parser::parse`]
//! (spec §4.1). `parse(format!("{cfg}"))` reproduces `cfg` structurally.

use super::ast::{CommandAttrs, Config, Group};
use crate::model::{Action, Script};
use std::fmt;

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn write_command(out: &mut String, indent: usize, cmd: &CommandAttrs) {
    let pad = "    ".repeat(indent);
    if cmd.nickname.is_empty() {
        out.push_str(&format!("{pad}cmd {{\n"));
    } else {
        out.push_str(&format!("{pad}cmd \"{}\" {{\n", escape_str(&cmd.nickname)));
    }
    // Alphabetical by attribute name, excluding `group`/`nickname`; only
    // emitted when non-default (spec §4.1).
    if cmd.auto_respawn {
        out.push_str(&format!("{pad}    auto_respawn = \"true\";\n"));
    }
    if !cmd.exec.is_empty() {
        out.push_str(&format!("{pad}    exec = \"{}\";\n", escape_str(&cmd.exec)));
    }
    if !cmd.host.is_empty() {
        out.push_str(&format!("{pad}    host = \"{}\";\n", escape_str(&cmd.host)));
    }
    out.push_str(&format!("{pad}}}"));
}

fn write_group(out: &mut String, group: &Group) {
    if group.name.is_empty() {
        let rendered: Vec<String> = group
            .commands
            .iter()
            .map(|c| {
                let mut s = String::new();
                write_command(&mut s, 0, c);
                s
            })
            .collect();
        out.push_str(&rendered.join("\n"));
    } else {
        out.push_str(&format!("group \"{}\" {{\n", escape_str(&group.name)));
        let rendered: Vec<String> = group
            .commands
            .iter()
            .map(|c| {
                let mut s = String::new();
                write_command(&mut s, 1, c);
                s
            })
            .collect();
        out.push_str(&rendered.join("\n"));
        out.push_str("\n}\n");
    }
}

fn format_action(action: &Action) -> String {
    match action {
        Action::Start {
            ident_type,
            ident,
            wait,
        } => format_start_stop_restart("start", *ident_type, ident.as_deref(), *wait),
        Action::Stop {
            ident_type,
            ident,
            wait,
        } => format_start_stop_restart("stop", *ident_type, ident.as_deref(), *wait),
        Action::Restart {
            ident_type,
            ident,
            wait,
        } => format_start_stop_restart("restart", *ident_type, ident.as_deref(), *wait),
        Action::WaitMs(delay_ms) => format!("wait ms {delay_ms};"),
        Action::WaitStatus {
            ident_type,
            ident,
            wait,
        } => format!(
            "wait {ident_type} \"{}\" status \"{wait}\";",
            escape_str(ident)
        ),
        Action::RunScript(name) => format!("run_script \"{}\";", escape_str(name)),
    }
}

fn format_start_stop_restart(
    verb: &str,
    ident_type: crate::model::IdentType,
    ident: Option<&str>,
    wait: Option<crate::model::WaitFor>,
) -> String {
    let ident_str = match ident {
        Some(ident) => format!("{ident_type} \"{}\"", escape_str(ident)),
        None => ident_type.to_string(),
    };
    match wait {
        Some(wait) => format!("{verb} {ident_str} wait \"{wait}\";"),
        None => format!("{verb} {ident_str};"),
    }
}

fn write_script(out: &mut String, script: &Script) {
    out.push_str(&format!("script \"{}\" {{", escape_str(&script.name)));
    for action in &script.actions {
        out.push_str(&format!("\n    {}", format_action(action)));
    }
    out.push_str("\n}\n");
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups: Vec<&Group> = self.groups.iter().collect();
        groups.sort_by_key(|g| g.name.to_lowercase());
        let mut out = String::new();
        let rendered: Vec<String> = groups
            .iter()
            .map(|g| {
                let mut s = String::new();
                write_group(&mut s, g);
                s
            })
            .collect();
        out.push_str(&rendered.join("\n"));
        out.push('\n');

        let mut scripts: Vec<&Script> = self.scripts.iter().collect();
        scripts.sort_by_key(|s| s.name.to_lowercase());
        let rendered: Vec<String> = scripts
            .iter()
            .map(|s| {
                let mut o = String::new();
                write_script(&mut o, s);
                o
            })
            .collect();
        out.push_str(&rendered.join("\n"));
        write!(f, "{out}")
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    #[test]
    fn round_trips_a_config() {
        let src = r#"
            group "svc" {
                cmd "web" { exec = "/bin/web"; host = "h1"; auto_respawn = true; }
                cmd { exec = "/bin/side"; host = "h2"; }
            }
            script "deploy" {
                start cmd "web" wait "running";
                wait ms 50;
                stop group "svc" wait "stopped";
                run_script "cleanup";
            }
            script "cleanup" {
                stop everything;
            }
        "#;
        let cfg = parse(src).unwrap();
        let rendered = cfg.to_string();
        let reparsed = parse(&rendered).unwrap();

        assert_eq!(cfg.groups.len(), reparsed.groups.len());
        assert_eq!(cfg.scripts.len(), reparsed.scripts.len());
        for (a, b) in cfg.groups.iter().zip(reparsed.groups.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.commands, b.commands);
        }
        for (a, b) in cfg.scripts.iter().zip(reparsed.scripts.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.actions, b.actions);
        }
    }

    #[test]
    fn unnamed_group_renders_as_bare_cmd_blocks() {
        let src = r#"cmd { exec = "/bin/true"; host = "h"; }"#;
        let cfg = parse(src).unwrap();
        let rendered = cfg.to_string();
        assert!(!rendered.contains("group \"\""));
        assert!(rendered.contains("cmd {"));
    }

    #[test]
    fn groups_sorted_case_insensitively() {
        let src = r#"
            group "Zeta" { cmd { exec = "/bin/z"; host = "h"; } }
            group "alpha" { cmd { exec = "/bin/a"; host = "h"; } }
        "#;
        let cfg = parse(src).unwrap();
        let rendered = cfg.to_string();
        let alpha_pos = rendered.find("alpha").unwrap();
        let zeta_pos = rendered.find("Zeta").unwrap();
        assert!(alpha_pos < zeta_pos);
    }
}
