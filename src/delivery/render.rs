use super::Renderer;
use crate::pipeline::{EmailPayload, Payload};
use crate::subscription::{Frequency, User};
use anyhow::Result;
use chrono::NaiveDate;
use std::fmt::Write;

/// True when no repository in the digest has anything to report.
pub fn is_empty(digest: &EmailPayload) -> bool {
    digest.content.iter().all(Payload::is_empty)
}

pub fn subject(date: NaiveDate) -> String {
    format!("GitHub Activity Digest for {}", date.format("%b %d,%Y"))
}

/// Plain-text digest body.
pub struct TextRenderer;

impl TextRenderer {
    fn render_repo(out: &mut String, payload: &Payload) -> std::fmt::Result {
        writeln!(out, "== {} ==", payload.repo_name)?;

        if !payload.open_issues.is_empty() {
            writeln!(out, "Open issues ({}):", payload.open_issues.len())?;
            for issue in &payload.open_issues {
                writeln!(out, "  #{} {} ({}) {}", issue.number, issue.title, issue.author, issue.url)?;
            }
        }
        if !payload.closed_issues.is_empty() {
            writeln!(out, "Closed issues ({}):", payload.closed_issues.len())?;
            for issue in &payload.closed_issues {
                writeln!(out, "  #{} {} ({}) {}", issue.number, issue.title, issue.author, issue.url)?;
            }
        }
        if !payload.comments.is_empty() {
            writeln!(out, "New comments ({}):", payload.comments.len())?;
            for comment in &payload.comments {
                writeln!(out, "  {} on #{}: {}", comment.author, comment.issue_id, comment.body)?;
                writeln!(out, "    {}", comment.url)?;
            }
        }
        if payload.no_comment {
            match payload.no_comment_since {
                Some(since) => writeln!(out, "No comments since {}.", since.format("%b %d, %Y"))?,
                None => writeln!(out, "No comments this period.")?,
            }
        }
        writeln!(out)
    }
}

impl Renderer for TextRenderer {
    fn render(&self, user: &User, digest: &EmailPayload, frequency: Frequency) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "Hi {},", user.login)?;
        writeln!(out, "here is your {} GitHub activity digest.", frequency)?;
        writeln!(out)?;
        for payload in digest.content.iter().filter(|p| !p.is_empty()) {
            Self::render_repo(&mut out, payload)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Comment, Issue};
    use chrono::{TimeZone, Utc};

    fn digest() -> EmailPayload {
        let at = Utc.with_ymd_and_hms(2017, 8, 2, 9, 0, 0).unwrap();
        EmailPayload {
            email: "me@x.io".to_string(),
            content: vec![
                Payload {
                    repo_name: "org/repo".to_string(),
                    open_issues: vec![Issue {
                        id: 10,
                        number: 4,
                        title: "Crash on start".to_string(),
                        author: "octocat".to_string(),
                        created_at: at,
                        updated_at: at,
                        repo: "https://api.github.com/repos/org/repo".to_string(),
                        url: "https://github.com/org/repo/issues/4".to_string(),
                    }],
                    comments: vec![Comment {
                        id: 99,
                        issue_id: "4".to_string(),
                        body: "Same here".to_string(),
                        author: "hubot".to_string(),
                        created_at: at,
                        updated_at: at,
                        repo: "https://api.github.com/repos/org/repo".to_string(),
                        url: "https://github.com/org/repo/issues/4#issuecomment-99".to_string(),
                    }],
                    ..Payload::default()
                },
                Payload::empty("org/idle"),
                Payload {
                    no_comment: true,
                    no_comment_since: Some(Utc.with_ymd_and_hms(2017, 7, 27, 0, 0, 10).unwrap()),
                    ..Payload::empty("org/silent")
                },
            ],
        }
    }

    #[test]
    fn test_subject() {
        let date = NaiveDate::from_ymd_opt(2006, 1, 2).unwrap();
        assert_eq!(subject(date), "GitHub Activity Digest for Jan 02,2006");
    }

    #[test]
    fn test_is_empty() {
        assert!(!is_empty(&digest()));
        let quiet = EmailPayload {
            email: "me@x.io".to_string(),
            content: vec![Payload::empty("org/a"), Payload::empty("org/b")],
        };
        assert!(is_empty(&quiet));
    }

    #[test]
    fn test_render_skips_idle_repos() {
        let user = User {
            id: 1,
            login: "octocat".to_string(),
            email: "me@x.io".to_string(),
            subscriptions: vec![],
        };
        let body = TextRenderer.render(&user, &digest(), Frequency::Weekly).unwrap();
        assert!(body.starts_with("Hi octocat,\nhere is your weekly GitHub activity digest."));
        assert!(body.contains("== org/repo ==\nOpen issues (1):\n  #4 Crash on start (octocat)"));
        assert!(body.contains("hubot on #4: Same here"));
        assert!(body.contains("== org/silent ==\nNo comments since Jul 27, 2017."));
        assert!(!body.contains("org/idle"));
    }
}
