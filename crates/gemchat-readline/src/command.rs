//! REPL command parsing.

use anyhow::{Result, anyhow, bail};

pub const COMMANDS: &[&str] = &[
    "/send",
    "/new",
    "/list",
    "/switch",
    "/rename",
    "/delete",
    "/temp",
    "/tokens",
    "/image",
    "/multimodal",
    "/history",
    "/model",
    "/reset",
    "/help",
    "/quit",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain text: becomes the draft text and is submitted.
    Message(String),
    /// Sends the draft as it is, e.g. an image without a caption.
    Send,
    New(Option<String>),
    List,
    /// Conversation id or 1-based position in `/list`.
    Switch(String),
    Rename(String),
    Delete(Option<String>),
    Temperature(f32),
    MaxOutputTokens(u32),
    Image(String),
    Multimodal(bool),
    History,
    Model,
    Reset,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<Command> {
    let line = line.trim();
    if line == "quit" || line == "exit" {
        return Ok(Command::Quit);
    }
    if !line.starts_with('/') {
        return Ok(Command::Message(line.to_string()));
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let command = match name {
        "/send" => Command::Send,
        "/new" => Command::New(arg),
        "/list" => Command::List,
        "/switch" => Command::Switch(required(arg, "/switch <id|number>")?),
        "/rename" => Command::Rename(required(arg, "/rename <name>")?),
        "/delete" => Command::Delete(arg),
        "/temp" => {
            let value = required(arg, "/temp <value>")?;
            Command::Temperature(
                value
                    .parse()
                    .map_err(|_| anyhow!("Not a number: {value}"))?,
            )
        }
        "/tokens" => {
            let value = required(arg, "/tokens <count>")?;
            Command::MaxOutputTokens(
                value
                    .parse()
                    .map_err(|_| anyhow!("Not a token count: {value}"))?,
            )
        }
        "/image" => Command::Image(required(arg, "/image <path>")?),
        "/multimodal" => match arg.as_deref() {
            Some("on") => Command::Multimodal(true),
            Some("off") => Command::Multimodal(false),
            _ => bail!("Usage: /multimodal on|off"),
        },
        "/history" => Command::History,
        "/model" => Command::Model,
        "/reset" => Command::Reset,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => bail!("Unknown command: {other} (try /help)"),
    };
    Ok(command)
}

fn required(arg: Option<String>, usage: &str) -> Result<String> {
    arg.ok_or_else(|| anyhow!("Usage: {usage}"))
}

pub const HELP: &str = "\
/send                send the draft as is (an attached image needs no caption)
/new [name]          start a conversation and switch to it
/list                list conversations
/switch <id|number>  switch conversation (discards the draft)
/rename <name>       rename the current conversation
/delete [id|number]  delete a conversation (default: current)
/temp <value>        set temperature for the current conversation
/tokens <count>      set max output tokens for the current conversation
/image <path>        attach an image to the draft (add a caption or /send)
/multimodal on|off   send the attached image with the next message
/history             show the current conversation
/model               show the configured model
/reset               forget the API key and run setup again
/quit                exit
Anything else is sent as a message.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_message() {
        assert_eq!(
            parse("  hello there ").unwrap(),
            Command::Message("hello there".into())
        );
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(parse("/new").unwrap(), Command::New(None));
        assert_eq!(
            parse("/new  Trip plans ").unwrap(),
            Command::New(Some("Trip plans".into()))
        );
        assert_eq!(parse("/switch 2").unwrap(), Command::Switch("2".into()));
        assert_eq!(parse("/temp 0.3").unwrap(), Command::Temperature(0.3));
        assert_eq!(parse("/tokens 512").unwrap(), Command::MaxOutputTokens(512));
        assert_eq!(parse("/multimodal off").unwrap(), Command::Multimodal(false));
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_send_submits_draft_without_text() {
        assert_eq!(parse("/send").unwrap(), Command::Send);
        assert_eq!(parse("  /send  ").unwrap(), Command::Send);
        assert!(HELP.contains("/send"));
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        assert_eq!(parse("/temp 7.5").unwrap(), Command::Temperature(7.5));
        assert_eq!(parse("/tokens 0").unwrap(), Command::MaxOutputTokens(0));
    }

    #[test]
    fn test_invalid_commands() {
        assert!(parse("/switch").is_err());
        assert!(parse("/temp warm").is_err());
        assert!(parse("/tokens -1").is_err());
        assert!(parse("/multimodal maybe").is_err());
        assert!(parse("/frobnicate").is_err());
    }
}
