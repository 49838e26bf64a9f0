//! Caller-facing text: prompts, captions, and naming.
//!
//! Everything here is Telegram HTML; user-provided values are escaped.

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Deterministic artifact name for the 1-based `index`: `001_video`.
pub fn output_name(index: usize) -> String {
    format!("{index:03}_video")
}

/// Telegram caption size limit for media messages, counted after markup.
pub const CAPTION_LIMIT: usize = 1024;

/// Longest quality value shown in a caption.
const MAX_QUALITY_CHARS: usize = 16;

/// Caption attached to the upload of item `index`.
///
/// The label absorbs whatever room the other parts leave under
/// [`CAPTION_LIMIT`].
pub fn caption(index: usize, label: &str, quality: &str, attribution: &str) -> String {
    let quality = truncate_chars(quality, MAX_QUALITY_CHARS);
    let fixed = format!("📹 Video {index}\nBatch: \nQuality: {quality}p\nBy: {attribution}")
        .chars()
        .count();
    let label = truncate_chars(label, CAPTION_LIMIT.saturating_sub(fixed));
    format!(
        "<b>📹 Video {index}</b>\n<b>Batch:</b> {}\n<b>Quality:</b> {}p\n<b>By:</b> {}",
        escape_html(label),
        escape_html(quality),
        escape_html(attribution),
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Static reply to `/start`.
pub const GREETING: &str = "<b>👋 Hi!</b>\n\
<b>🟢 I'm alive! Use /master to start a batch.</b>\n\n\
<b>How it works:</b>\n\
1. Send a .txt file or a message with one link per line\n\
2. Name the batch (or /d to use the file name)\n\
3. Pick the maximum resolution, e.g. 720\n\
4. Give the channel ID (or /d for this chat)\n\n\
Every link is downloaded and posted to the channel in order.\n\
Send /cancel at any time to stop.";
