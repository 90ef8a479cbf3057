use serde::Serialize;

/// Where a call's dialog currently is.
///
/// Ending the call is not a state; a transition to `None` ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DialogState {
    /// Listen for a spoken command
    RootMenu,
    /// Apologize for a failed listen, then go back to the entry state
    ListenFailure,
    TellTime,
    TellJoke,
    /// Explain echo mode
    EchoStart,
    /// Repeat whatever the caller says until they leave
    Echo,
    /// Prompt for and collect a DTMF number
    AwaitingDigits,
    /// Read the entered number back
    Reply { target: u32 },
    Scaling { target: u32 },
    Confirm { target: u32 },
}

impl DialogState {
    pub fn name(&self) -> &'static str {
        match self {
            DialogState::RootMenu => "root_menu",
            DialogState::ListenFailure => "listen_failure",
            DialogState::TellTime => "tell_time",
            DialogState::TellJoke => "tell_joke",
            DialogState::EchoStart => "echo_start",
            DialogState::Echo => "echo",
            DialogState::AwaitingDigits => "awaiting_digits",
            DialogState::Reply { .. } => "reply",
            DialogState::Scaling { .. } => "scaling",
            DialogState::Confirm { .. } => "confirm",
        }
    }

    /// States that block on caller input
    pub fn gathers_input(&self) -> bool {
        matches!(
            self,
            DialogState::RootMenu | DialogState::Echo | DialogState::AwaitingDigits
        )
    }
}

impl std::fmt::Display for DialogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogState::Reply { target }
            | DialogState::Scaling { target }
            | DialogState::Confirm { target } => write!(f, "{}({})", self.name(), target),
            _ => f.write_str(self.name()),
        }
    }
}

/// A spoken command from the root menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hangup,
    Time,
    Joke,
    Echo,
    /// Scale request, with the count if one could be found
    Scale(Option<u32>),
    Greeting,
    Unknown,
}

const HANGUP_WORDS: &[&str] = &["bye", "hangup", "hang up"];
const LEAVE_ECHO_WORDS: &[&str] = &["cancel", "menu"];

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Case-insensitive substring match against any of `needles`.
pub fn contains_any(text: &str, needles: &[&str]) -> bool {
    let text = text.to_lowercase();
    needles.iter().any(|needle| text.contains(needle))
}

pub fn is_hangup(text: &str) -> bool {
    contains_any(text, HANGUP_WORDS)
}

pub fn is_leave_echo(text: &str) -> bool {
    contains_any(text, LEAVE_ECHO_WORDS)
}

/// Route an utterance to a command. Earlier rules win, so "goodbye" hangs
/// up even if it also mentions the time.
pub fn route_command(text: &str) -> Command {
    if is_hangup(text) {
        Command::Hangup
    } else if contains_any(text, &["time"]) {
        Command::Time
    } else if contains_any(text, &["laugh", "joke"]) {
        Command::Joke
    } else if contains_any(text, &["echo", "repeat"]) {
        Command::Echo
    } else if contains_any(text, &["scale"]) {
        Command::Scale(parse_count(text))
    } else if contains_any(text, &["hello"]) {
        Command::Greeting
    } else {
        Command::Unknown
    }
}

/// First count in an utterance: a base-10 number or a number word up to ten.
pub fn parse_count(text: &str) -> Option<u32> {
    text.split_whitespace().find_map(|word| {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if let Ok(count) = word.parse::<u32>() {
            return Some(count);
        }
        NUMBER_WORDS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, count)| *count)
    })
}
