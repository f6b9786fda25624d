//! Facts about a ticket that are derived for display only.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::db::ticket::{Priority, Status, Ticket};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ru,
}

/// Calendar date of `now` as seen at `offset`.
pub fn local_date(now: OffsetDateTime, offset: UtcOffset) -> Date {
    now.to_offset(offset).date()
}

/// Days from `today` until the deadline, negative once it has passed.
///
/// `None` when there's no deadline or it no longer matters because the
/// ticket is finished.
pub fn days_left(ticket: &Ticket, today: Date) -> Option<i64> {
    if matches!(
        ticket.status,
        Status::Denied | Status::Complete | Status::Cancelled
    ) {
        return None;
    }
    ticket.deadline.map(|d| (d - today).whole_days())
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeadlineUrgency {
    Ok,
    DueTomorrow,
    DueToday,
    Overdue,
}

impl DeadlineUrgency {
    pub fn from_days_left(days: i64) -> Self {
        match days {
            2.. => Self::Ok,
            1 => Self::DueTomorrow,
            0 => Self::DueToday,
            _ => Self::Overdue,
        }
    }
}

pub fn deadline_urgency(ticket: &Ticket, today: Date) -> Option<DeadlineUrgency> {
    days_left(ticket, today).map(DeadlineUrgency::from_days_left)
}

/// Phrase describing how much time is left until the deadline.
pub fn remaining(ticket: &Ticket, today: Date, locale: Locale) -> Option<String> {
    let days = days_left(ticket, today)?;
    let deadline = ticket.deadline?;
    Some(match (locale, days) {
        // The deadline day itself doesn't count as a full day left.
        (Locale::En, 2..) => match days - 1 {
            1 => "1 day left".to_string(),
            n => format!("{n} days left"),
        },
        (Locale::En, 1) => "Last day left".to_string(),
        (Locale::En, 0) => "Due today".to_string(),
        (Locale::En, _) => format!("Overdue since {deadline}"),
        (Locale::Ru, 2..) => {
            let n = days - 1;
            let (left, unit) = match ru_plural(n) {
                RuPlural::One => ("Остался", "день"),
                RuPlural::Few => ("Осталось", "дня"),
                RuPlural::Many => ("Осталось", "дней"),
            };
            format!("{left} {n} {unit}")
        }
        (Locale::Ru, 1) => "Остался последний день".to_string(),
        (Locale::Ru, 0) => "Крайний срок".to_string(),
        (Locale::Ru, _) => format!(
            "Просрочено с {:02}.{:02}.{}",
            deadline.day(),
            u8::from(deadline.month()),
            deadline.year(),
        ),
    })
}

enum RuPlural {
    One,
    Few,
    Many,
}

fn ru_plural(n: i64) -> RuPlural {
    match (n % 10, n % 100) {
        (1, r) if r != 11 => RuPlural::One,
        (2..=4, r) if !(12..=14).contains(&r) => RuPlural::Few,
        _ => RuPlural::Many,
    }
}

impl Status {
    pub fn label(self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => match self {
                Self::New => "New",
                Self::Delayed => "Delayed",
                Self::Denied => "Denied",
                Self::InWork => "In work",
                Self::Control => "Control",
                Self::Complete => "Complete",
                Self::Cancelled => "Cancelled",
            },
            Locale::Ru => match self {
                Self::New => "Новая",
                Self::Delayed => "Отложена",
                Self::Denied => "Отклонена",
                Self::InWork => "В работе",
                Self::Control => "Контроль",
                Self::Complete => "Завершена",
                Self::Cancelled => "Отменена",
            },
        }
    }
}

impl Priority {
    pub fn label(self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => match self {
                Self::Ordinary => "Ordinary",
                Self::Medium => "Medium",
                Self::High => "High",
                Self::Urgent => "Urgent",
                Self::Critical => "Critical",
            },
            Locale::Ru => match self {
                Self::Ordinary => "Обычный",
                Self::Medium => "Средний",
                Self::High => "Высокий",
                Self::Urgent => "Срочный",
                Self::Critical => "Критический",
            },
        }
    }
}
