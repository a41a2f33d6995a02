use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use coursebook_core::models::ProfileUpdate;
use coursebook_core::{Config, CourseClient};

use crate::render;

#[derive(Debug, Parser)]
#[command(name = "coursebook", version, about = "Browse and follow courses from the terminal")]
pub struct Cli {
    /// Override the API base URL (e.g. http://localhost:8000/api)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Show whether a session is active and when it is renewed
    Status,
    /// List featured courses
    Featured,
    /// List course categories
    Categories,
    /// Search the catalogue
    Search {
        query: String,
        /// Extra filters as key=value, e.g. level=beginner
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Show one course
    Course { id: i64 },
    /// List the modules of a course
    Modules { course_id: i64 },
    /// Show the content of a module
    Content { module_id: i64 },
    /// Mark a content item as completed
    Complete { content_id: i64 },
    /// Record partial progress on a content item
    Progress { content_id: i64, percent: u8 },
    /// Enroll in a course
    Enroll { course_id: i64 },
    /// List courses you are enrolled in
    Enrolled,
    /// Show or update your profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Change your password
    ChangePassword,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty filter key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    Ok(password)
}

pub async fn run(command: Command, client: &CourseClient, config: &mut Config) -> Result<()> {
    let session = client.session();

    match command {
        Command::Login { email } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt_line("Email")?,
            };
            let password = prompt_password("Password")?;

            println!("Authenticating...");
            client.login(&email, &password).await?;

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Login successful!");
        }
        Command::Logout => client.logout(),
        Command::Register { name, email } => {
            let password = prompt_password("Password")?;
            let confirm = prompt_password("Confirm password")?;
            client.register(&name, &email, &password, &confirm).await?;
            println!("Registration successful! Run `coursebook login --email {}`.", email);
        }
        Command::Status => print!("{}", render::status(session)),
        Command::Featured => {
            let courses = client.featured_courses().await?;
            print!("{}", render::course_cards(&courses));
        }
        Command::Categories => {
            let categories = client.categories().await?;
            print!("{}", render::categories(&categories));
        }
        Command::Search { query, filters } => {
            let results = client.search_courses(&query, &filters).await?;
            print!("{}", render::search_results(&results));
        }
        Command::Course { id } => {
            if !session.require_auth() {
                return Ok(());
            }
            let course = client.course(id).await?;
            print!("{}", render::course_details(&course));
        }
        Command::Modules { course_id } => {
            if !session.require_auth() {
                return Ok(());
            }
            let modules = client.course_modules(course_id).await?;
            print!("{}", render::modules(&modules));
        }
        Command::Content { module_id } => {
            if !session.require_auth() {
                return Ok(());
            }
            let content = client.module_content(module_id).await?;
            print!("{}", render::module_content(&content));
        }
        Command::Complete { content_id } => {
            client.update_progress(content_id, 100).await?;
            println!("Content {} marked as completed.", content_id);
        }
        Command::Progress { content_id, percent } => {
            client.update_progress(content_id, percent).await?;
            println!("{}", coursebook_core::utils::progress_bar(percent, 20));
        }
        Command::Enroll { course_id } => {
            let result = client
                .enroll(course_id)
                .await
                .context("Failed to enroll in the course. Please try again.")?;
            if result.success {
                println!("Successfully enrolled in the course!");
            } else {
                println!(
                    "{}",
                    result.message.as_deref().unwrap_or("Enrollment was not accepted.")
                );
            }
        }
        Command::Enrolled => {
            let courses = client.enrolled_courses().await?;
            print!("{}", render::course_cards(&courses));
        }
        Command::Profile { name, email } => {
            let update = ProfileUpdate {
                name,
                email,
                ..Default::default()
            };
            let profile = if update.is_empty() {
                client.profile().await?
            } else {
                client.update_profile(&update).await?
            };
            print!("{}", render::profile(&profile));
        }
        Command::ChangePassword => {
            let current = prompt_password("Current password")?;
            let new = prompt_password("New password")?;
            let confirm = prompt_password("Confirm new password")?;
            if new != confirm {
                anyhow::bail!("Passwords do not match");
            }
            client.change_password(&current, &new).await?;
            println!("Password changed.");
        }
    }

    Ok(())
}
