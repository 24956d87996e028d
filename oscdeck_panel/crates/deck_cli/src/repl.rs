use crate::session::PanelCommand;
use deck_core::protocol::ParamValue;

pub const HELP: &str = "\
commands:
  show                      print the current state
  set <name> <json>         set a parameter (bare words are taken as strings)
  fire <name>               fire a trigger
  xy <name> <u> <v>         set an xy pad from normalized input
  nudge <name> <n>          set a slider from normalized input
  save [i]                  save into slot i, or the active slot
  load <i>                  load slot i
  delete [i]                delete slot i, or the active slot
  record on|off             begin or finish a capture
  connect | disconnect      control the bridge link
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Show,
    Help,
    Quit,
    Panel(PanelCommand),
}

pub fn parse(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let panel = |cmd| Ok(ReplCommand::Panel(cmd));
    match (word, args.as_slice()) {
        ("show", []) => Ok(ReplCommand::Show),
        ("help" | "?", _) => Ok(ReplCommand::Help),
        ("quit" | "exit", []) => Ok(ReplCommand::Quit),
        ("connect", []) => panel(PanelCommand::Connect),
        ("disconnect", []) => panel(PanelCommand::Disconnect),
        ("set", [name, ..]) => {
            let raw = rest[name.len()..].trim();
            if raw.is_empty() {
                return Err("usage: set <name> <json>".to_string());
            }
            panel(PanelCommand::Set {
                name: name.to_string(),
                value: parse_value(raw),
            })
        }
        ("fire", [name]) => panel(PanelCommand::Fire(name.to_string())),
        ("xy", [name, u, v]) => panel(PanelCommand::Normalized {
            name: name.to_string(),
            input: vec![number(u)?, number(v)?],
        }),
        ("nudge", [name, n]) => panel(PanelCommand::Normalized {
            name: name.to_string(),
            input: vec![number(n)?],
        }),
        ("save", []) => panel(PanelCommand::Save(None)),
        ("save", [i]) => panel(PanelCommand::Save(Some(index(i)?))),
        ("load", [i]) => panel(PanelCommand::Load(index(i)?)),
        ("delete", []) => panel(PanelCommand::Delete(None)),
        ("delete", [i]) => panel(PanelCommand::Delete(Some(index(i)?))),
        ("record", ["on"]) => panel(PanelCommand::Record(true)),
        ("record", ["off"]) => panel(PanelCommand::Record(false)),
        ("", []) => Err(String::new()),
        _ => Err(format!("unrecognized command: {line} (try 'help')")),
    }
}

fn parse_value(raw: &str) -> ParamValue {
    serde_json::from_str(raw).unwrap_or_else(|_| ParamValue::Text(raw.to_string()))
}

fn number(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("not a number: {s}"))
}

fn index(s: &str) -> Result<u32, String> {
    s.parse::<u32>()
        .map_err(|_| format!("not a preset index: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(line: &str) -> PanelCommand {
        match parse(line) {
            Ok(ReplCommand::Panel(cmd)) => cmd,
            other => panic!("{line:?} parsed as {other:?}"),
        }
    }

    #[test]
    fn set_takes_json_or_bare_words() {
        assert_eq!(
            panel("set volume 0.8"),
            PanelCommand::Set {
                name: "volume".into(),
                value: ParamValue::Number(0.8)
            }
        );
        assert_eq!(
            panel("set list [1, 2.5]"),
            PanelCommand::Set {
                name: "list".into(),
                value: ParamValue::List(vec![1.0, 2.5])
            }
        );
        assert_eq!(
            panel("set mode dark room"),
            PanelCommand::Set {
                name: "mode".into(),
                value: ParamValue::Text("dark room".into())
            }
        );
        assert!(parse("set volume").is_err());
    }

    #[test]
    fn normalized_inputs() {
        assert_eq!(
            panel("xy pos 0.5 1"),
            PanelCommand::Normalized {
                name: "pos".into(),
                input: vec![0.5, 1.0]
            }
        );
        assert_eq!(
            panel("nudge volume 0.25"),
            PanelCommand::Normalized {
                name: "volume".into(),
                input: vec![0.25]
            }
        );
        assert!(parse("xy pos 0.5").is_err());
        assert!(parse("nudge volume NaN").is_err());
    }

    #[test]
    fn preset_slots_are_optional_where_allowed() {
        assert_eq!(panel("save"), PanelCommand::Save(None));
        assert_eq!(panel("save 3"), PanelCommand::Save(Some(3)));
        assert_eq!(panel("delete"), PanelCommand::Delete(None));
        assert_eq!(panel("load 0"), PanelCommand::Load(0));
        assert!(parse("load").is_err());
        assert!(parse("load -1").is_err());
    }

    #[test]
    fn misc_commands() {
        assert_eq!(parse("show"), Ok(ReplCommand::Show));
        assert_eq!(parse("  quit "), Ok(ReplCommand::Quit));
        assert_eq!(panel("record on"), PanelCommand::Record(true));
        assert_eq!(panel("record off"), PanelCommand::Record(false));
        assert_eq!(panel("fire flash"), PanelCommand::Fire("flash".into()));
        assert!(parse("record maybe").is_err());
        assert!(parse("frobnicate").is_err());
    }
}
