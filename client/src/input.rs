//! Console command parsing

use shared::{GameId, Packet, PieceKind, Square, Team};

pub const HELP: &str = "\
Commands:
  join <game> [white|black]         watch a game, taking a seat if a color is given
  observe <game>                    watch a game without a seat
  move <game> <from> <to> [q|r|b|n] move a piece, e.g. `move 1 e2 e4`
  resign <game>                     give up the game
  leave <game>                      stop watching a game
  help                              show this list
  quit                              disconnect and exit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(Packet),
    Help,
    Quit,
}

/// Turns one typed line into a command, acting as `username`.
///
/// Square notation is checked here so typos are caught before they reach the
/// server; legality is left to the server.
pub fn parse_command(line: &str, username: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Err("type `help` for a list of commands".to_string());
    };
    let username = username.to_string();

    let packet = match (verb.to_ascii_lowercase().as_str(), args) {
        ("help", []) => return Ok(Command::Help),
        ("quit" | "exit", []) => return Ok(Command::Quit),
        ("join", [game, rest @ ..]) if rest.len() <= 1 => Packet::Join {
            game_id: parse_game_id(game)?,
            username,
            color: rest.first().map(|color| parse_team(color)).transpose()?,
        },
        ("observe", [game]) => Packet::Observe {
            game_id: parse_game_id(game)?,
            username,
        },
        ("move", [game, from, to, rest @ ..]) if rest.len() <= 1 => Packet::Move {
            game_id: parse_game_id(game)?,
            username,
            from: parse_square(from)?,
            to: parse_square(to)?,
            promotion: rest.first().map(|kind| parse_promotion(kind)).transpose()?,
        },
        ("resign", [game]) => Packet::Resign {
            game_id: parse_game_id(game)?,
            username,
        },
        ("leave", [game]) => Packet::Leave {
            game_id: parse_game_id(game)?,
            username,
        },
        ("help" | "quit" | "exit" | "join" | "observe" | "move" | "resign" | "leave", _) => {
            return Err(format!("wrong arguments for `{}`, type `help` for usage", verb));
        }
        _ => return Err(format!("unknown command `{}`", verb)),
    };

    Ok(Command::Send(packet))
}

fn parse_game_id(word: &str) -> Result<GameId, String> {
    word.parse()
        .map_err(|_| format!("`{}` is not a game number", word))
}

fn parse_team(word: &str) -> Result<Team, String> {
    match word.to_ascii_lowercase().as_str() {
        "white" | "w" => Ok(Team::White),
        "black" | "b" => Ok(Team::Black),
        _ => Err(format!("`{}` is not a color, use white or black", word)),
    }
}

fn parse_square(word: &str) -> Result<String, String> {
    let square: Square = word.parse().map_err(|e| format!("{}", e))?;
    Ok(square.to_string())
}

fn parse_promotion(word: &str) -> Result<PieceKind, String> {
    let mut chars = word.chars();
    match (chars.next().and_then(PieceKind::from_symbol), chars.next()) {
        (Some(kind), None) if kind.is_promotion_target() => Ok(kind),
        _ => Err(format!("`{}` is not a promotion piece, use q, r, b or n", word)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(line: &str) -> Packet {
        match parse_command(line, "alice") {
            Ok(Command::Send(packet)) => packet,
            other => panic!("{:?} parsed as {:?}", line, other),
        }
    }

    #[test]
    fn test_parse_join() {
        assert_eq!(
            send("join 4 white"),
            Packet::Join {
                game_id: 4,
                username: "alice".to_string(),
                color: Some(Team::White),
            }
        );
        assert_eq!(
            send("JOIN 4"),
            Packet::Join {
                game_id: 4,
                username: "alice".to_string(),
                color: None,
            }
        );
        assert!(parse_command("join 4 green", "alice").is_err());
        assert!(parse_command("join four", "alice").is_err());
    }

    #[test]
    fn test_parse_move() {
        assert_eq!(
            send("move 2 E2 e4"),
            Packet::Move {
                game_id: 2,
                username: "alice".to_string(),
                from: "e2".to_string(),
                to: "e4".to_string(),
                promotion: None,
            }
        );
        assert_eq!(
            send("move 2 a7 a8 n"),
            Packet::Move {
                game_id: 2,
                username: "alice".to_string(),
                from: "a7".to_string(),
                to: "a8".to_string(),
                promotion: Some(PieceKind::Knight),
            }
        );
    }

    #[test]
    fn test_parse_move_rejects_bad_input() {
        for line in [
            "move 2 e2",
            "move 2 e2 e9",
            "move 2 x2 e4",
            "move 2 a7 a8 k",
            "move 2 a7 a8 qq",
            "move 2 a7 a8 q extra",
        ] {
            assert!(parse_command(line, "alice").is_err(), "accepted {:?}", line);
        }
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(parse_command("help", "alice"), Ok(Command::Help));
        assert_eq!(parse_command("  quit ", "alice"), Ok(Command::Quit));
        assert_eq!(
            send("observe 9"),
            Packet::Observe {
                game_id: 9,
                username: "alice".to_string(),
            }
        );
        assert_eq!(
            send("resign 9"),
            Packet::Resign {
                game_id: 9,
                username: "alice".to_string(),
            }
        );
        assert_eq!(
            send("leave 9"),
            Packet::Leave {
                game_id: 9,
                username: "alice".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_unknown_or_empty() {
        assert!(parse_command("", "alice").is_err());
        assert!(parse_command("castle 1", "alice").is_err());
        assert!(parse_command("resign", "alice").is_err());
    }
}
