use chrono::{Local, TimeZone};
use humansize::{format_size, BINARY};

/// Human readable byte count, binary units.
pub fn fsize(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

/// Transfer rate in bytes per second.
pub fn fspeed(bytes_per_sec: f64) -> String {
    format!("{}/s", fsize(bytes_per_sec.max(0.0) as u64))
}

/// Rate with an optional limit in KiB/s; a negative limit means unlimited.
pub fn fspeed_limit(bytes_per_sec: f64, limit_kib: i64) -> String {
    let speed = fspeed(bytes_per_sec);
    if limit_kib > -1 {
        format!("{} ({} KiB/s)", speed, limit_kib)
    } else {
        speed
    }
}

pub fn fpcnt(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// Connected peer count, with the swarm total when known.
pub fn fpeer(num: i64, total: i64) -> String {
    if total > -1 {
        format!("{} ({})", num, total)
    } else {
        num.to_string()
    }
}

/// Compact duration: the two most significant units, empty for zero.
pub fn ftime(seconds: i64) -> String {
    if seconds <= 0 {
        return String::new();
    }
    let (days, rem) = (seconds / 86_400, seconds % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, secs) = (rem / 60, rem % 60);

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Local date and time for a unix timestamp.
pub fn fdate(timestamp: f64) -> String {
    match Local.timestamp_opt(timestamp as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => String::new(),
    }
}

/// Queue position shown 1-based; negative means not queued.
pub fn fqueue(queue: i64) -> String {
    if queue < 0 {
        String::new()
    } else {
        (queue + 1).to_string()
    }
}

pub fn fratio(ratio: f64) -> String {
    if ratio < 0.0 {
        "\u{221E}".to_string()
    } else {
        format!("{:.3}", ratio)
    }
}

pub fn fsize2(size: u64, second_size: Option<u64>) -> String {
    match second_size {
        Some(second) if second > 0 => format!("{} ({})", fsize(size), fsize(second)),
        _ => fsize(size),
    }
}

pub fn fpieces(pieces: i64, length: u64) -> String {
    format!("{} ({})", pieces, fsize(length))
}

pub fn fpriority(priority: i64) -> &'static str {
    match priority {
        0 => "Do Not Download",
        1 => "Normal",
        2 => "High",
        5 => "Highest",
        _ => "Normal",
    }
}
