/// Renders a countdown as `HH:MM:SS`.
pub fn format_countdown(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Renders whole minutes for the completion view. Zero means "not recorded".
pub fn format_time_taken(minutes: u32) -> String {
    if minutes == 0 {
        return "N/A".to_string();
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins} min")
    }
}
