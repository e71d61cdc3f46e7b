//! Customers, editorial content, and inbound messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    BlogPostId, ContactSubmissionId, CustomerId, Email, EmailError, FaqId, StoreLocationId,
    SubscriberId,
};

/// A customer profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    /// Older profiles imported from the legacy shop may lack an email.
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Email for display only. Missing emails become `customer-<id>@no-email.invalid`.
    ///
    /// Never use this for identity or authorization decisions.
    #[must_use]
    pub fn display_email(&self) -> String {
        self.email.as_ref().map_or_else(
            || format!("customer-{}@no-email.invalid", self.id),
            ToString::to_string,
        )
    }

    /// Full name, or the display email when no name is on file.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| self.display_email(), ToString::to_string)
    }
}

/// A blog post row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: BlogPostId,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    pub published: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl BlogPost {
    /// Body split into paragraphs on blank lines.
    #[must_use]
    pub fn paragraphs(&self) -> Vec<&str> {
        self.body
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }
}

/// An FAQ entry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub id: FaqId,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub position: i32,
}

/// A showroom row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLocation {
    pub id: StoreLocationId,
    pub name: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub hours: Option<String>,
}

/// A contact form submission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub id: ContactSubmissionId,
    pub name: String,
    pub email: Email,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default)]
    pub handled: bool,
    pub created_at: DateTime<Utc>,
}

/// A newsletter subscriber row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterSubscriber {
    pub id: SubscriberId,
    pub email: Email,
    pub subscribed_at: DateTime<Utc>,
}

/// Validated contact form, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: Email,
    pub subject: Option<String>,
    pub message: String,
}

/// Contact form problems, shown next to the form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    #[error("please tell us your name")]
    MissingName,
    #[error("please enter a valid email address")]
    InvalidEmail(#[from] EmailError),
    #[error("please include a message")]
    MissingMessage,
    #[error("messages are limited to {max} characters")]
    MessageTooLong { max: usize },
}

impl ContactMessage {
    /// Longest accepted message body.
    pub const MAX_MESSAGE_LENGTH: usize = 5000;

    /// Validate raw form input.
    ///
    /// # Errors
    ///
    /// Returns the first [`ContactError`] found.
    pub fn validate(
        name: &str,
        email: &str,
        subject: Option<&str>,
        message: &str,
    ) -> Result<Self, ContactError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContactError::MissingName);
        }
        let email = Email::parse(email)?;
        let message = message.trim();
        if message.is_empty() {
            return Err(ContactError::MissingMessage);
        }
        if message.chars().count() > Self::MAX_MESSAGE_LENGTH {
            return Err(ContactError::MessageTooLong {
                max: Self::MAX_MESSAGE_LENGTH,
            });
        }

        Ok(Self {
            name: name.to_string(),
            email,
            subject: subject
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn customer(email: Option<&str>, name: Option<&str>) -> Customer {
        Customer {
            id: CustomerId::new(12),
            email: email.map(|e| Email::parse(e).unwrap()),
            full_name: name.map(ToString::to_string),
            phone: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_email_placeholder() {
        assert_eq!(
            customer(None, None).display_email(),
            "customer-12@no-email.invalid"
        );
        assert_eq!(
            customer(Some("ana@home.example"), None).display_email(),
            "ana@home.example"
        );
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(customer(Some("ana@home.example"), Some("  ")).display_name(), "ana@home.example");
        assert_eq!(customer(None, Some("Ana Silva")).display_name(), "Ana Silva");
    }

    #[test]
    fn test_contact_validation() {
        assert_eq!(
            ContactMessage::validate(" ", "a@b.co", None, "hi"),
            Err(ContactError::MissingName)
        );
        assert!(matches!(
            ContactMessage::validate("Ana", "nope", None, "hi"),
            Err(ContactError::InvalidEmail(_))
        ));
        assert_eq!(
            ContactMessage::validate("Ana", "a@b.co", None, "   "),
            Err(ContactError::MissingMessage)
        );

        let ok = ContactMessage::validate("Ana", "A@B.co", Some(" "), " Hello ").unwrap();
        assert_eq!(ok.email.as_str(), "a@b.co");
        assert_eq!(ok.subject, None);
        assert_eq!(ok.message, "Hello");
    }

    #[test]
    fn test_blog_paragraphs() {
        let post = BlogPost {
            id: BlogPostId::new(1),
            slug: "care".to_string(),
            title: "Caring for oak".to_string(),
            excerpt: String::new(),
            body: "First.\n\n\n\nSecond.\n\n".to_string(),
            published: true,
            published_at: None,
        };
        assert_eq!(post.paragraphs(), vec!["First.", "Second."]);
    }
}
