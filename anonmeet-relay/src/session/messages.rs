//! Participant-facing message text

use anonmeet_common::time::format_remaining;
use std::time::Duration;

use crate::types::{ChannelId, ParticipantId};

const PARTNER_PLACEHOLDER: &str = "[your partner]";

/// Settings the templates need
pub struct NoticeContext<'a> {
    pub end_marker: &'a str,
    pub end_reaction: &'a str,
    pub lifetime: Duration,
    pub community_channel: Option<&'a str>,
}

/// First post in each side channel after a match
pub fn match_notice(rationale: &str, ctx: &NoticeContext<'_>) -> String {
    let mut text = format!(
        "You have a match! Everything you write here is passed on to your partner anonymously.\n\n\
         *Why you were matched:*\n{}\n\n\
         To end the conversation, post a message containing `{}` or react to any message with :{}:. \
         Ending reveals both of you to each other. \
         Otherwise the channel is archived automatically after {}.",
        rationale,
        ctx.end_marker,
        ctx.end_reaction,
        format_remaining(ctx.lifetime),
    );
    if let Some(channel) = ctx.community_channel {
        text.push_str(&format!("\n\nQuestions or feedback? Come say hi in <#{}>.", channel));
    }
    text
}

/// Direct message pointing a participant at their new channel
pub fn match_direct_message(channel: &ChannelId) -> String {
    format!(
        "Good news: we found someone who shares your interests. Say hello in <#{}>.",
        channel
    )
}

pub fn remaining_notice(remaining: Duration) -> String {
    format!("This channel will be archived in {}.", format_remaining(remaining))
}

/// Reveal after an end marker or end reaction
pub fn explicit_reveal(partner: &ParticipantId, grace: Duration) -> String {
    if grace.is_zero() {
        format!(
            "The conversation has ended. Your partner was {}. This channel is being archived now.",
            partner.mention()
        )
    } else {
        format!(
            "The conversation has ended. Your partner was {}. This channel will be archived in {}.",
            partner.mention(),
            format_remaining(grace)
        )
    }
}

/// Reveal when the lifetime runs out
pub fn timeout_reveal(partner: &ParticipantId) -> String {
    format!(
        "Time is up and this channel is being archived. Your partner was {}. \
         Let us know how we can make it better!",
        partner.mention()
    )
}

/// Relayed copy of a message, addressed to the recipient
///
/// Any mention of the sender's identity is redacted before forwarding.
pub fn relayed(recipient: &ParticipantId, sender: &ParticipantId, text: &str) -> String {
    format!(
        "{} Your partner says:\n>{}",
        recipient.mention(),
        redact(text, sender).replace('\n', "\n>")
    )
}

/// Strip a participant's identity token from text
///
/// Tokens are opaque and matched whole: `U1` is redacted in `hi U1!` but
/// left alone inside `U12`, which names someone else.
pub fn redact(text: &str, who: &ParticipantId) -> String {
    let text = text.replace(&who.mention(), PARTNER_PLACEHOLDER);
    replace_whole_token(&text, who.as_str(), PARTNER_PLACEHOLDER)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

fn replace_whole_token(text: &str, token: &str, with: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (at, _) in text.match_indices(token) {
        let end = at + token.len();
        let joined_before = text[..at].chars().next_back().is_some_and(is_token_char);
        let joined_after = text[end..].chars().next().is_some_and(is_token_char);
        if joined_before || joined_after {
            continue;
        }
        out.push_str(&text[last..at]);
        out.push_str(with);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

pub fn transcript_reply(query: &str, transcripts: &[(String, Vec<String>)]) -> String {
    if transcripts.is_empty() {
        return format!("No logs found for channel {}.", query);
    }
    transcripts
        .iter()
        .map(|(name, lines)| format!("*{}*\n{}", name, lines.join("\n")))
        .collect::<Vec<_>>()
        .join("\n\n")
}
