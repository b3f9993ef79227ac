use chrono_tz::Tz;

use crate::engine::slots::to_local;
use crate::model::Span;

use super::Mail;

/// `2024-06-01 10:00 ~ 11:30`, with the end date repeated only when it differs.
pub fn format_range(tz: Tz, span: &Span) -> String {
    match (to_local(tz, span.start), to_local(tz, span.end)) {
        (Some(start), Some(end)) if start.date() == end.date() => {
            format!("{} ~ {}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"))
        }
        (Some(start), Some(end)) => format!(
            "{} ~ {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        ),
        _ => format!("{} ~ {}", span.start, span.end),
    }
}

pub fn verification_code(to: &str, code: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Your verification code".into(),
        body: format!(
            "Your verification code is: {code}\n\n\
             It expires in 5 minutes.\n\n\
             If you didn't request this, you can safely ignore this email."
        ),
        cc: None,
    }
}

pub fn waitlist_approved(to: &str, booking_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "You can now book a meeting".into(),
        body: format!(
            "Hello,\n\n\
             Your waitlist request was approved. Book a time here:\n\n\
             {booking_url}\n\n\
             Thank you."
        ),
        cc: None,
    }
}

pub fn meeting_approved(
    to: &str,
    name: &str,
    when: &str,
    meet_link: Option<&str>,
    cc: Option<&str>,
) -> Mail {
    Mail {
        to: to.to_string(),
        subject: format!("Google Meet meeting with {name}"),
        body: format!(
            "Hello {name},\n\n\
             Your meeting request was approved for:\n\n\
             Time: {when}\n\
             Google Meet: {}\n\n\
             Thank you.",
            meet_link.unwrap_or("(link to follow)")
        ),
        cc: cc.map(str::to_string),
    }
}

pub fn reminder(to: &str, name: &str, when: &str, meet_link: Option<&str>) -> Mail {
    Mail {
        to: to.to_string(),
        subject: format!("[Reminder] {name}, your meeting starts soon"),
        body: format!(
            "Hello {name},\n\n\
             Your meeting starts soon.\n\n\
             Time: {when}\n\
             Google Meet: {}\n",
            meet_link.unwrap_or("(no link)")
        ),
        cc: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEOUL: Tz = chrono_tz::Asia::Seoul;

    #[test]
    fn range_on_one_day() {
        // 2024-06-01 10:00 to 11:30 KST
        let span = Span::new(1_717_203_600_000, 1_717_209_000_000);
        assert_eq!(format_range(SEOUL, &span), "2024-06-01 10:00 ~ 11:30");
    }

    #[test]
    fn range_across_midnight() {
        // 2024-06-01 23:30 to 2024-06-02 00:30 KST
        let span = Span::new(1_717_252_200_000, 1_717_255_800_000);
        assert_eq!(
            format_range(SEOUL, &span),
            "2024-06-01 23:30 ~ 2024-06-02 00:30"
        );
    }

    #[test]
    fn approval_mail_has_link_and_cc() {
        let mail = meeting_approved(
            "guest@example.com",
            "Kim",
            "2024-06-01 10:00 ~ 11:30",
            Some("https://meet.google.com/abc"),
            Some("host@example.com"),
        );
        assert!(mail.body.contains("https://meet.google.com/abc"));
        assert!(mail.body.contains("2024-06-01 10:00 ~ 11:30"));
        assert_eq!(mail.cc.as_deref(), Some("host@example.com"));
    }

    #[test]
    fn code_mail_contains_code() {
        let mail = verification_code("a@example.com", "042137");
        assert!(mail.body.contains("042137"));
        assert_eq!(mail.cc, None);
    }
}
