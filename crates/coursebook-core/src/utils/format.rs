/// Length of the description excerpt shown on course cards
const EXCERPT_LEN: usize = 100;

/// Thumbnail shown for courses without one
pub const DEFAULT_THUMBNAIL: &str = "images/default-course.jpg";

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// First 100 characters of a course description, always followed by "..."
pub fn course_excerpt(description: &str) -> String {
    let excerpt: String = description.chars().take(EXCERPT_LEN).collect();
    format!("{}...", excerpt)
}

/// Rating for display, "New" for courses nobody has rated yet
pub fn rating_display(rating: Option<f64>) -> String {
    match rating {
        Some(r) if r > 0.0 => format!("{:.1}", r),
        _ => "New".to_string(),
    }
}

pub fn thumbnail_or_default(thumbnail: Option<&str>) -> &str {
    thumbnail.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_THUMBNAIL)
}

/// Icon name for a category; unknown categories get a book.
pub fn category_icon(category_name: &str) -> &'static str {
    match category_name {
        "Programming" => "code",
        "Design" => "palette",
        "Business" => "briefcase",
        "Marketing" => "bullhorn",
        "Music" => "music",
        "Photography" => "camera",
        _ => "book",
    }
}

pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) if p > 0.0 => format!("${:.2}", p),
        _ => "Free".to_string(),
    }
}

/// Fixed-width text progress bar, e.g. `[#####-----] 50%`
pub fn progress_bar(percent: u8, width: usize) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * width / 100;
    format!(
        "[{}{}] {}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        percent
    )
}
