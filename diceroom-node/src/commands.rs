//! Stdin command parsing

use diceroom_core::{DieId, DICE_TYPES};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(u8),
    Remove(DieId),
    Clear,
    Roll,
    Quick(u8),
    Emoji(String),
    Name(String),
    Color(String),
    Material(String),
    Texture(String),
    Label(String),
    Cursor(f64, f64),
    Peers,
    Pool,
    History,
    NewRoom(String),
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  add <d6|6>        - Stage a die
  remove <die-id>   - Unstage one of your dice
  clear             - Unstage all your dice
  roll              - Roll the whole pool
  quick <d20>       - Roll a single die right away
  emoji <glyph>     - React (👍 🎉 🔥 😱 💀 ❤️)
  name <name>       - Change your name
  color <#hex>      - Change your color
  material <m>      - Dice material
  texture <t>       - Dice texture
  label <#hex>      - Dice label color
  cursor <x> <y>    - Move your cursor (0..1)
  peers             - Show peers in the room
  pool              - Show staged dice
  history           - Show recent rolls
  new-room <name>   - Create a new room id
  quit              - Exit
";

/// `d6`, `D6` or `6`
fn parse_sides(s: &str) -> Result<u8, String> {
    let digits = s.strip_prefix(['d', 'D']).unwrap_or(s);
    match digits.parse::<u8>() {
        Ok(sides) if DICE_TYPES.contains(&sides) => Ok(sides),
        _ => Err(format!("Unsupported die \"{}\" (use d2, d4, d6, d8, d10, d12 or d20)", s)),
    }
}

fn rest(parts: &[&str], usage: &str) -> Result<String, String> {
    if parts.len() < 2 {
        return Err(format!("Usage: {}", usage));
    }
    Ok(parts[1..].join(" "))
}

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return Ok(None);
    };

    let cmd = match *first {
        "add" => Command::Add(parse_sides(parts.get(1).ok_or("Usage: add <d6>")?)?),
        "remove" | "rm" => Command::Remove(DieId::from(rest(&parts, "remove <die-id>")?)),
        "clear" => Command::Clear,
        "roll" => Command::Roll,
        "quick" => Command::Quick(parse_sides(parts.get(1).ok_or("Usage: quick <d20>")?)?),
        "emoji" => Command::Emoji(rest(&parts, "emoji <glyph>")?),
        "name" => Command::Name(rest(&parts, "name <name>")?),
        "color" => Command::Color(rest(&parts, "color <#hex>")?),
        "material" => Command::Material(rest(&parts, "material <name>")?),
        "texture" => Command::Texture(rest(&parts, "texture <name>")?),
        "label" => Command::Label(rest(&parts, "label <#hex>")?),
        "cursor" if parts.len() >= 3 => {
            let x = parts[1].parse::<f64>().map_err(|_| "Invalid x".to_string())?;
            let y = parts[2].parse::<f64>().map_err(|_| "Invalid y".to_string())?;
            Command::Cursor(x, y)
        }
        "cursor" => return Err("Usage: cursor <x> <y>".to_string()),
        "peers" => Command::Peers,
        "pool" => Command::Pool,
        "history" => Command::History,
        "new-room" => Command::NewRoom(rest(&parts, "new-room <name>")?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command \"{}\". Try: help", other)),
    };
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dice_commands() {
        assert_eq!(parse("add d6"), Ok(Some(Command::Add(6))));
        assert_eq!(parse("add 20"), Ok(Some(Command::Add(20))));
        assert_eq!(parse("quick D12"), Ok(Some(Command::Quick(12))));
        assert!(parse("add d7").is_err());
        assert!(parse("add").is_err());
    }

    #[test]
    fn test_text_arguments_keep_spaces() {
        assert_eq!(
            parse("name  Sir Rolls-a-lot"),
            Ok(Some(Command::Name("Sir Rolls-a-lot".to_string())))
        );
        assert_eq!(parse("emoji 🎉"), Ok(Some(Command::Emoji("🎉".to_string()))));
    }

    #[test]
    fn test_cursor() {
        assert_eq!(parse("cursor 0.5 1"), Ok(Some(Command::Cursor(0.5, 1.0))));
        assert!(parse("cursor 0.5").is_err());
        assert!(parse("cursor a b").is_err());
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(parse("   "), Ok(None));
        assert!(parse("explode").is_err());
    }
}
