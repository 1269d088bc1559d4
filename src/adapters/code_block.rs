const FENCE: &str = "```";

/// 取出回覆中第一個 fenced code block 的內容（去掉語言標記與前後空白）
pub fn extract_code_block(reply: &str) -> Option<String> {
    let start = reply.find(FENCE)? + FENCE.len();
    let after_fence = &reply[start..];

    let first_line_end = after_fence.find('\n').unwrap_or(after_fence.len());
    let first_line = &after_fence[..first_line_end];

    let code = if let Some(end) = first_line.find(FENCE) {
        // ```print(1)``` 這種單行寫法沒有語言標記
        &first_line[..end]
    } else {
        let body = after_fence.get(first_line_end + 1..)?;
        let end = body.find(FENCE)?;
        &body[..end]
    };

    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}
