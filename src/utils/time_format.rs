use std::time::Duration;

/// 格式化耗时为友好显示格式 (例如: "1 小时 2 分 3 秒")
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();

    match seconds {
        0 => format!("{} 毫秒", elapsed.as_millis()),
        1..=59 => format!("{:.1} 秒", elapsed.as_secs_f64()),
        60..=3599 => format!("{} 分 {} 秒", seconds / 60, seconds % 60),
        _ => format!(
            "{} 小时 {} 分 {} 秒",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        ),
    }
}

/// 按千位分组显示计数 (例如: "10,000,000")
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
