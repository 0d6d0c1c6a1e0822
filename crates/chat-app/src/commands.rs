use std::path::PathBuf;

use murmur_chat::chat::ScrollMetrics;
use snafu::Snafu;

/// Slash command typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Attach(PathBuf),
    /// 1-based position in the `/files` listing.
    Remove(usize),
    RemoveAll,
    Files,
    Scroll(ScrollMetrics),
    Jump,
    New,
    History,
    Settings,
    Set { field: String, value: String },
    Export,
    Clear,
    Help,
    Quit,
}

#[derive(Debug, Snafu, PartialEq)]
pub enum CommandError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { name: String },
    #[snafu(display("usage: {usage}"))]
    Usage { usage: &'static str },
}

pub const HELP: &str = "\
/attach <path>                 queue a file for the next message
/remove <n> | /remove all      drop queued file number n, or every queued file
/files                         list queued files
/scroll <height> <top> <client> report viewport geometry
/jump                          jump to the latest message
/new                           start a new conversation
/set <field> <value>           change a setting, used from the next /new
/history | /settings | /export | /clear
/quit                          exit
End a line with \\ to continue the message on the next line.";

impl HostCommand {
    /// Parses a slash command. Lines that do not start with `/` are message text and
    /// yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, CommandError>> {
        let rest = line.trim().strip_prefix('/')?;
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map(|(name, args)| (name, args.trim()))
            .unwrap_or((rest, ""));

        let command = match name {
            "attach" if args.is_empty() => Err(CommandError::Usage {
                usage: "/attach <path>",
            }),
            "attach" => Ok(Self::Attach(PathBuf::from(args))),
            "remove" if args == "all" => Ok(Self::RemoveAll),
            "remove" => args
                .parse::<usize>()
                .ok()
                .filter(|index| *index > 0)
                .map(Self::Remove)
                .ok_or(CommandError::Usage {
                    usage: "/remove <n>",
                }),
            "files" => Ok(Self::Files),
            "scroll" => parse_metrics(args).map(Self::Scroll).ok_or(CommandError::Usage {
                usage: "/scroll <height> <top> <client>",
            }),
            "jump" => Ok(Self::Jump),
            "new" => Ok(Self::New),
            "history" => Ok(Self::History),
            "settings" => Ok(Self::Settings),
            "set" => match args.split_once(char::is_whitespace) {
                Some((field, value)) => Ok(Self::Set {
                    field: field.to_string(),
                    value: value.trim().to_string(),
                }),
                None => Err(CommandError::Usage {
                    usage: "/set <field> <value>",
                }),
            },
            "export" => Ok(Self::Export),
            "clear" => Ok(Self::Clear),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(CommandError::UnknownCommand {
                name: other.to_string(),
            }),
        };

        Some(command)
    }
}

fn parse_metrics(args: &str) -> Option<ScrollMetrics> {
    let values = args
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    match values.as_slice() {
        [height, top, client] if values.iter().all(|value| value.is_finite()) => {
            Some(ScrollMetrics::new(*height, *top, *client))
        }
        _ => None,
    }
}
