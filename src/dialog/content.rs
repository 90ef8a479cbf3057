//! What the dialog says

use chrono::{DateTime, Local};
use uuid::Uuid;

pub const GREETING: &str = "Hello. How may I help you?";
pub const PARTING: &str = "Good bye. Thanks for calling.";
pub const TIMEOUT: &str = "Sorry, your time is up.";
pub const LISTEN_FAILURE: &str = "Sorry, I failed to listen";
pub const NOTHING_HEARD: &str = "Sorry, I didn't hear anything. How may I help you?";
pub const UNKNOWN_COMMAND: &str = "Sorry, I don't know how to do that";
pub const ECHO_START: &str = "go ahead. say cancel or menu to exit";
pub const DIGITS_PROMPT: &str = "Hello. Please enter your number.";

/// Phrases passed to the recognizer to boost the menu vocabulary
pub const DEFAULT_HINTS: &[&str] = &[
    "asterisk", "bye", "cancel", "echo", "goodbye", "hangup", "hello", "joke", "menu", "scale",
    "time",
];

const JOKES: &[&str] = &[
    "I hate Russian dolls, they're so full of themselves.",
    "The first time I got a universal remote control I thought to myself, this changes everything.",
    "I recently decided to sell my vacuum cleaner as all it was doing was gathering dust.",
    "You can never lose a homing pigeon. If your homing pigeon doesn't come back, what you've lost is a pigeon.",
    "Don't you hate it when someone answers their own questions? I do.",
    "Where there's a will, there's a relative.",
    "Hedgehogs, eh? Why can't they just share the hedge?",
    "Just because nobody complains doesn't mean all parachutes are perfect.",
    "Velcro. What a rip-off!",
    "My friend keeps trying to convince me that he's a compulsive liar, but I don't believe him.",
    "It's always hard to explain puns to kleptomaniacs because they're always taking things literally.",
];

pub fn joke() -> &'static str {
    let pick = Uuid::new_v4().as_u128() % JOKES.len() as u128;
    JOKES[pick as usize]
}

pub fn jokes() -> &'static [&'static str] {
    JOKES
}

/// Hours and minutes, spoken as two numbers
pub fn spoken_time(now: DateTime<Local>) -> String {
    now.format("%H %M").to_string()
}

pub fn you_entered(target: u32) -> String {
    format!("You entered {}", target)
}

pub fn refusal(max: u32) -> String {
    format!("Sorry, I can only scale to {} instances", max)
}

pub fn scaled(name: &str, target: u32) -> String {
    if target == 1 {
        format!("Scaled {} to 1 instance", name)
    } else {
        format!("{} has been scaled to {} instances.", name, target)
    }
}
