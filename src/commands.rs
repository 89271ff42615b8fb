//! The command surface (spec §4.7): lines beginning with `/` are parsed
//! into commands; everything else is plain chat text.

use crate::connection::ConnectionManager;
use crate::gossip::GossipTable;
use crate::types::{Direction, PeerAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Clear,
    Nick(String),
    /// `/sendfile <path>` — spec's file picker is an external UI
    /// collaborator; the path argument stands in for it here.
    SendFile(String),
    Peers,
    Unknown(String),
    Text(String),
}

/// Parses one line of user input (spec §4.7). Commands are case-sensitive
/// and dispatch on the leading `/<word>`.
pub fn parse(input: &str) -> Command {
    if let Some(rest) = input.strip_prefix('/') {
        let mut parts = rest.splitn(2, ' ');
        let word = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("").trim();
        return match word {
            "clear" => Command::Clear,
            "nick" if !arg.is_empty() => Command::Nick(arg.to_string()),
            "sendfile" if !arg.is_empty() => Command::SendFile(arg.to_string()),
            "peers" => Command::Peers,
            _ => Command::Unknown(word.to_string()),
        };
    }
    Command::Text(input.to_string())
}

pub const HELP_LINE: &str =
    "[SYSTEM] unknown command. available: /clear, /nick <name>, /sendfile <path>, /peers";

/// Renders the `/peers` view (spec §4.7): direct links with direction,
/// then mesh peers with their via-nickname.
pub fn format_peers(connections: &ConnectionManager, gossip: &GossipTable, local_address: &PeerAddress) -> Vec<String> {
    let mut lines = vec![format!("[SYSTEM] local address: {local_address}")];

    lines.push("[SYSTEM] direct links:".to_string());
    for (addr, display_name, direction) in connections.direct_peers() {
        let arrow = match direction {
            Direction::Inbound => "<-",
            Direction::Outbound => "->",
        };
        lines.push(format!("  {arrow} {display_name} ({addr})"));
    }

    lines.push("[SYSTEM] mesh peers:".to_string());
    for (addr, peer) in gossip.entries() {
        lines.push(format!(
            "  {} ({addr}) via {}",
            peer.nickname, peer.via_nickname
        ));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clear() {
        assert_eq!(parse("/clear"), Command::Clear);
    }

    #[test]
    fn parses_nick_with_argument() {
        assert_eq!(parse("/nick Alice"), Command::Nick("Alice".to_string()));
    }

    #[test]
    fn nick_without_argument_is_unknown() {
        assert_eq!(parse("/nick"), Command::Unknown("nick".to_string()));
    }

    #[test]
    fn parses_sendfile_and_peers() {
        assert_eq!(parse("/sendfile /tmp/photo.bin"), Command::SendFile("/tmp/photo.bin".to_string()));
        assert_eq!(parse("/peers"), Command::Peers);
    }

    #[test]
    fn sendfile_without_argument_is_unknown() {
        assert_eq!(parse("/sendfile"), Command::Unknown("sendfile".to_string()));
    }

    #[test]
    fn unrecognized_slash_command_is_unknown() {
        assert_eq!(parse("/bogus"), Command::Unknown("bogus".to_string()));
    }

    #[test]
    fn plain_text_is_text_command() {
        assert_eq!(parse("hello world"), Command::Text("hello world".to_string()));
    }
}
