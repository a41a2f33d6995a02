//! Plain-text rendering of catalogue data for the terminal.

use std::fmt::Write;

use coursebook_core::models::{Category, CategoryRef, Content, ContentType, Course, Module, UserProfile};
use coursebook_core::utils::{
    category_icon, course_excerpt, format_price, rating_display, thumbnail_or_default, truncate,
};
use coursebook_core::{SessionManager, SessionState};

/// Width of module descriptions in listings
const DESCRIPTION_WIDTH: usize = 72;

pub fn course_cards(courses: &[Course]) -> String {
    let mut out = String::new();
    for course in courses {
        let _ = writeln!(out, "[{}] {}", course.id, course.title);
        let _ = writeln!(out, "    {}", course_excerpt(&course.description));
        let _ = writeln!(
            out,
            "    by {} | rating {} | {}",
            course.instructor_name(),
            rating_display(course.rating),
            format_price(course.price)
        );
        out.push('\n');
    }
    out
}

pub fn search_results(results: &[Course]) -> String {
    if results.is_empty() {
        return "No courses found matching your search criteria.\n".to_string();
    }
    course_cards(results)
}

pub fn categories(categories: &[Category]) -> String {
    let mut out = String::new();
    for category in categories {
        let _ = writeln!(
            out,
            "({}) {} [{}]",
            category.id,
            category.name,
            category_icon(&category.name)
        );
        if !category.description.is_empty() {
            let _ = writeln!(out, "    {}", category.description);
        }
    }
    out
}

pub fn course_details(course: &Course) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", course.title);
    let _ = writeln!(out, "{}", "=".repeat(course.title.chars().count()));
    let _ = writeln!(out, "{}", course.description);
    out.push('\n');
    let _ = writeln!(out, "Instructor: {}", course.instructor_name());
    let _ = writeln!(out, "Rating:     {}", rating_display(course.rating));
    if let Some(students) = course.enrolled_students {
        let _ = writeln!(out, "Students:   {}", students);
    }
    if let Some(level) = course.level {
        let _ = writeln!(out, "Level:      {}", level);
    }
    if let Some(CategoryRef::Detail(ref category)) = course.category {
        let _ = writeln!(out, "Category:   {}", category.name);
    } else if let Some(CategoryRef::Name(ref name)) = course.category {
        let _ = writeln!(out, "Category:   {}", name);
    }
    let _ = writeln!(out, "Price:      {}", format_price(course.price));
    if course.is_published == Some(false) {
        let _ = writeln!(out, "Status:     Draft (not published)");
    }
    let _ = writeln!(out, "Thumbnail:  {}", thumbnail_or_default(course.thumbnail.as_deref()));
    out
}

pub fn modules(modules: &[Module]) -> String {
    let mut out = String::new();
    for module in modules {
        let _ = writeln!(out, "[{}] {}", module.id, module.title);
        if !module.description.is_empty() {
            let _ = writeln!(out, "    {}", truncate(&module.description, DESCRIPTION_WIDTH));
        }
        let duration = module.duration.as_deref().unwrap_or("-");
        let lessons = module.content_count.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string());
        let _ = writeln!(out, "    {} | {} lessons", duration, lessons);
    }
    out
}

fn content_body(content: &Content) -> String {
    match content.content_type {
        ContentType::Video => format!("video: {}", content.file.as_deref().unwrap_or("(no file)")),
        ContentType::Pdf => format!("pdf: {}", content.file.as_deref().unwrap_or("(no file)")),
        ContentType::Text => content.text_content.clone(),
        ContentType::Other => "Unsupported content type".to_string(),
    }
}

pub fn module_content(items: &[Content]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "[{}] {}", item.id, item.title);
        for line in content_body(item).lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out
}

pub fn profile(profile: &UserProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:  {}", profile.display_name());
    if let Some(ref email) = profile.email {
        let _ = writeln!(out, "Email: {}", email);
    }
    for (key, value) in &profile.extra {
        let _ = writeln!(out, "{}: {}", key, value);
    }
    out
}

pub fn status(session: &SessionManager) -> String {
    let mut out = String::new();
    match session.state() {
        SessionState::LoggedOut => {
            let _ = writeln!(out, "Not logged in.");
        }
        SessionState::LoggedIn | SessionState::RenewalInFlight => {
            let _ = writeln!(out, "Logged in ({}).", session.config().api_base_url);
            if let Some(minutes) = session.minutes_until_expiry() {
                let _ = writeln!(out, "Access token expires in {} min.", minutes);
            }
            match session.pending_renewal_at() {
                Some(at) => {
                    let _ = writeln!(out, "Renewal scheduled at {}.", at.format("%H:%M:%S UTC"));
                }
                None => {
                    let _ = writeln!(out, "No renewal scheduled.");
                }
            }
        }
    }
    out
}
