//! Human-readable rendering of API records.

use colored::Colorize;
use flitsmeister::{Statistics, User};
use std::fmt::{Display, Write};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

fn push_field(output: &mut String, label: &str, value: Option<impl Display>) {
    let label = format!("{label:24}");
    match value {
        Some(value) => {
            let _ = writeln!(output, "{}{value}", label.bold());
        }
        None => {
            let _ = writeln!(output, "{}{}", label.bold(), "-".dimmed());
        }
    }
}

fn yes_no(value: Option<bool>) -> Option<&'static str> {
    value.map(|value| if value { "yes" } else { "no" })
}

fn join(values: Option<&Vec<String>>) -> Option<String> {
    values.map(|values| values.join(", "))
}

/// Formats a timestamp in the local offset, falling back to UTC.
pub fn local_time(timestamp: OffsetDateTime) -> String {
    let local = UtcOffset::current_local_offset()
        .map_or(timestamp, |offset| timestamp.to_offset(offset));
    local
        .format(TIMESTAMP)
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Converts a millisecond duration into hours, rounded down.
fn hours_from_millis(millis: i64) -> i64 {
    millis / 3_600_000
}

pub fn format_user(user: &User) -> String {
    let mut output = String::new();
    push_field(&mut output, "Username", user.username.as_deref());
    push_field(&mut output, "First name", user.first_name.as_deref());
    push_field(&mut output, "Object id", user.object_id.as_deref());
    push_field(&mut output, "Country", user.country_code.as_deref());
    push_field(&mut output, "Locale", user.locale.as_deref());
    push_field(&mut output, "Validated", yes_no(user.validated));
    push_field(&mut output, "Vehicle type", user.vehicle_type);
    push_field(&mut output, "Parking enabled", yes_no(user.parking_enabled));
    push_field(&mut output, "4411 account", yes_no(user.has_4411_account));
    push_field(&mut output, "4411 EV enabled", yes_no(user.ev_4411_enabled));
    push_field(&mut output, "4411 parking", yes_no(user.parking_4411_enabled));
    push_field(
        &mut output,
        "4411 payment method",
        yes_no(user.payment_method_4411_set),
    );
    push_field(&mut output, "Top speed", user.statistics_top_speed);
    push_field(&mut output, "Top sprint", user.statistics_top_sprint);
    push_field(&mut output, "Travel distance", user.statistics_travel_distance);
    push_field(
        &mut output,
        "Travel time (h)",
        user.statistics_travel_time.map(hours_from_millis),
    );
    push_field(&mut output, "Member since", user.created_at.map(local_time));
    output
}

pub fn format_statistics(stats: &Statistics) -> String {
    let mut output = String::new();
    push_field(&mut output, "Kilometres driven", stats.km_driven);
    push_field(&mut output, "UFO kilometres", stats.ufo_km_driven);
    push_field(
        &mut output,
        "Hours driven",
        stats.sec_driven.map(|seconds| seconds / 3600),
    );
    push_field(&mut output, "Top speed", stats.top_speed);
    push_field(&mut output, "Top 0-100 sprint (ms)", stats.top_100_sprint_ms);
    push_field(&mut output, "Fines avoided", stats.fines_avoided);
    push_field(&mut output, "Times in traffic", stats.times_in_traffic);
    push_field(&mut output, "Navigations finished", stats.navigation_finished);
    push_field(&mut output, "Top consecutive days", stats.top_consecutive_days);
    push_field(&mut output, "Total ratings", stats.total_ratings);
    push_field(&mut output, "Recruited", stats.recruiter);
    push_field(&mut output, "Ambassador", yes_no(stats.ambassador));
    push_field(&mut output, "Parked once", yes_no(stats.parked_once));
    push_field(
        &mut output,
        "Countries visited",
        join(stats.countries_visited.as_ref()),
    );
    push_field(
        &mut output,
        "Provinces visited",
        join(stats.provinces_visited.as_ref()),
    );
    output
}
