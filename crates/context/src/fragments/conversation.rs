//! Conversation fragment — the transcript tail as role-tagged lines.
//!
//! Never cached: it changes on every turn.

use signalsight_cache::FragmentKind;
use signalsight_core::conversation::{Role, TranscriptMessage};
use signalsight_core::token;

use super::Fragment;

pub const CONVERSATION_HEADER: &str = "[Conversation So Far]";

/// The rendered tail plus what was left out of it.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    pub fragment: Fragment,
    /// Lines rendered
    pub lines: usize,
    /// Lines inside the history window dropped to fit the token cap
    pub dropped: usize,
}

/// Render the last `history_turns` non-system messages, oldest first.
///
/// With a `token_cap`, the oldest lines are dropped until the block fits.
/// An empty window renders to empty content.
pub fn render_conversation(
    transcript: &[TranscriptMessage],
    history_turns: usize,
    token_cap: Option<usize>,
) -> ConversationWindow {
    let visible: Vec<&TranscriptMessage> = transcript
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let start = visible.len().saturating_sub(history_turns);
    let mut lines: Vec<String> = visible[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect();

    let mut dropped = 0;
    if let Some(cap) = token_cap {
        let header_tokens = token::estimate_tokens(CONVERSATION_HEADER) + 1;
        let mut used = header_tokens
            + lines
                .iter()
                .map(|l| token::estimate_tokens(l) + 1)
                .sum::<usize>();
        while !lines.is_empty() && used > cap {
            let removed = lines.remove(0);
            used -= token::estimate_tokens(&removed) + 1;
            dropped += 1;
        }
    }

    let content = if lines.is_empty() {
        String::new()
    } else {
        format!("{CONVERSATION_HEADER}\n{}", lines.join("\n"))
    };

    ConversationWindow {
        lines: lines.len(),
        dropped,
        fragment: Fragment::rendered(FragmentKind::Conversation, content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(n: usize) -> Vec<TranscriptMessage> {
        (0..n)
            .flat_map(|i| {
                [
                    TranscriptMessage::user(format!("question {i}")),
                    TranscriptMessage::assistant(format!("answer {i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn renders_role_tagged_lines() {
        let window = render_conversation(&exchange(1), 10, None);
        assert_eq!(
            &*window.fragment.content,
            "[Conversation So Far]\nuser: question 0\nassistant: answer 0"
        );
        assert_eq!(window.lines, 2);
        assert_eq!(window.dropped, 0);
    }

    #[test]
    fn keeps_only_last_n_lines() {
        let window = render_conversation(&exchange(10), 4, None);
        assert_eq!(window.lines, 4);
        assert!(window.fragment.content.contains("question 8"));
        assert!(!window.fragment.content.contains("question 7"));
    }

    #[test]
    fn system_messages_are_skipped() {
        let mut transcript = vec![TranscriptMessage::system("framing")];
        transcript.extend(exchange(1));
        let window = render_conversation(&transcript, 10, None);
        assert!(!window.fragment.content.contains("framing"));
        assert_eq!(window.lines, 2);
    }

    #[test]
    fn empty_transcript_renders_nothing() {
        let window = render_conversation(&[], 10, None);
        assert!(window.fragment.is_empty());
        assert_eq!(window.lines, 0);
    }

    #[test]
    fn token_cap_drops_oldest_first() {
        let transcript = exchange(5);
        let full = render_conversation(&transcript, 10, None);
        let cap = full.fragment.estimated_tokens - 4;

        let trimmed = render_conversation(&transcript, 10, Some(cap));
        assert!(trimmed.dropped > 0);
        assert!(trimmed.fragment.estimated_tokens <= cap);
        assert!(trimmed.fragment.content.ends_with("assistant: answer 4"));
        assert!(!trimmed.fragment.content.contains("question 0"));
    }

    #[test]
    fn zero_cap_drops_everything() {
        let window = render_conversation(&exchange(2), 10, Some(0));
        assert!(window.fragment.is_empty());
        assert_eq!(window.dropped, 4);
    }
}
