//! Line-oriented console front end
//!
//! Turns render commands into terminal lines and operator input lines into
//! [`OperatorCommand`]s. The binary wires both ends to stdout and stdin.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::mirror::Channel;
use crate::render::{ButtonState, RenderCommand};
use crate::session::OperatorCommand;

pub const HELP: &str = "\
Commands:
    connect                     (re)connect to the server
    scene <name>                switch the program scene
    sources [index...]          make exactly these sources visible
    volume <mic|desktop> <pct>  set a channel volume (0-100)
    mute <mic|desktop>          toggle a channel's mute
    transition                  transition preview to program
    stream                      start or stop streaming
    record                      start or stop recording
    dump                        print the mirrored state as JSON
    help                        show this help
    quit                        disconnect and exit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(OperatorCommand),
    Dump,
    Help,
    Empty,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}', try 'help'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown channel '{0}', expected mic or desktop")]
    UnknownChannel(String),

    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),
}

pub fn parse_line(line: &str) -> Result<ConsoleInput, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word {
        "" => return Ok(ConsoleInput::Empty),
        "help" | "?" => return Ok(ConsoleInput::Help),
        "dump" => return Ok(ConsoleInput::Dump),
        "connect" => OperatorCommand::Connect,
        // Scene names may contain spaces
        "scene" if !rest.is_empty() => OperatorCommand::SelectScene(rest.to_string()),
        "scene" => return Err(ParseError::Usage("scene <name>")),
        "sources" => OperatorCommand::SelectSources(
            args.iter()
                .map(|arg| parse_number(arg))
                .collect::<Result<BTreeSet<usize>, _>>()?,
        ),
        "volume" => match args.as_slice() {
            [channel, percent] => {
                let percent: u8 = parse_number(percent)?;
                if percent > 100 {
                    return Err(ParseError::Usage("volume <mic|desktop> <0-100>"));
                }
                OperatorCommand::SetVolume(parse_channel(channel)?, percent)
            }
            _ => return Err(ParseError::Usage("volume <mic|desktop> <0-100>")),
        },
        "mute" => match args.as_slice() {
            [channel] => OperatorCommand::ToggleMute(parse_channel(channel)?),
            _ => return Err(ParseError::Usage("mute <mic|desktop>")),
        },
        "transition" => OperatorCommand::Transition,
        "stream" => OperatorCommand::ToggleStreaming,
        "record" => OperatorCommand::ToggleRecording,
        "quit" | "exit" => OperatorCommand::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(ConsoleInput::Command(command))
}

fn parse_channel(word: &str) -> Result<Channel, ParseError> {
    match word {
        "mic" => Ok(Channel::Mic),
        "desktop" => Ok(Channel::Desktop),
        other => Err(ParseError::UnknownChannel(other.to_string())),
    }
}

fn parse_number<N: std::str::FromStr>(word: &str) -> Result<N, ParseError> {
    word.parse()
        .map_err(|_| ParseError::InvalidNumber(word.to_string()))
}

/// Terminal line for a render command, `None` for `Close`
pub fn format_render(command: &RenderCommand) -> Option<String> {
    let line = match command {
        RenderCommand::SceneList { names, selected } => {
            format!("scenes:  {}", marked_list(names, |i| Some(i) == *selected))
        }
        RenderCommand::SourceList { names, selected } => {
            format!("sources: {}", marked_list(names, |i| selected.contains(&i)))
        }
        RenderCommand::CurrentScene(scene) => format!("program: {}", scene),
        RenderCommand::ChannelVolume(channel, percent) => format!("{}: {}%", channel, percent),
        RenderCommand::ChannelMute(channel, muted) => {
            format!("{}: {}", channel, if *muted { "muted" } else { "live" })
        }
        RenderCommand::StreamButton(state) => format!("stream: {}", button_label(*state)),
        RenderCommand::RecordButton(state) => format!("record: {}", button_label(*state)),
        RenderCommand::StatusText(text) => format!("-- {}", text),
        RenderCommand::Close => return None,
    };
    Some(line)
}

fn marked_list(names: &[String], selected: impl Fn(usize) -> bool) -> String {
    if names.is_empty() {
        return "(none)".to_string();
    }
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mark = if selected(i) { '*' } else { ' ' };
            format!("[{}{}] {}", mark, i, name)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn button_label(state: ButtonState) -> &'static str {
    match state {
        ButtonState::Off => "off",
        ButtonState::On => "ON",
        ButtonState::Wait => "...",
    }
}
