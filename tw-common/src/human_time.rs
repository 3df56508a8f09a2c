//! Human-readable play times for the track caption
//!
//! Mirrors the relative wording a listener expects next to a scrobble:
//! "Now Playing" while a track is live, then progressively coarser
//! descriptions as the play recedes into the past.

use chrono::{DateTime, Duration, Utc};

pub const NOW_PLAYING: &str = "Now Playing";

/// Describe when a track was played, relative to `now`
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tw_common::human_time::describe_play;
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 15, 18, 0, 0).unwrap();
/// let played = Utc.with_ymd_and_hms(2024, 3, 15, 17, 45, 0).unwrap();
/// assert_eq!(describe_play(Some(played), false, now), "15 minutes ago");
/// assert_eq!(describe_play(None, true, now), "Now Playing");
/// ```
pub fn describe_play(played_at: Option<DateTime<Utc>>, now_playing: bool, now: DateTime<Utc>) -> String {
    if now_playing {
        return NOW_PLAYING.to_string();
    }

    let Some(played_at) = played_at else {
        return String::new();
    };

    let elapsed = now.signed_duration_since(played_at);

    // Clock skew can put a fresh scrobble slightly in the future
    if elapsed < Duration::minutes(1) {
        return "just now".to_string();
    }

    if elapsed < Duration::hours(1) {
        let minutes = elapsed.num_minutes();
        return if minutes == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{minutes} minutes ago")
        };
    }

    let clock = played_at.format("%H:%M");
    let days_back = (now.date_naive() - played_at.date_naive()).num_days();

    match days_back {
        0 => format!("today at {clock}"),
        1 => format!("yesterday at {clock}"),
        2..=6 => format!("last {} at {clock}", played_at.format("%A")),
        _ => played_at.format("%m/%d/%Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_now_playing_wins_over_timestamp() {
        assert_eq!(describe_play(Some(at(1, 0, 0)), true, at(15, 12, 0)), NOW_PLAYING);
    }

    #[test]
    fn test_missing_timestamp_is_blank() {
        assert_eq!(describe_play(None, false, at(15, 12, 0)), "");
    }

    #[test]
    fn test_recent_and_future_are_just_now() {
        let now = at(15, 12, 0);
        assert_eq!(describe_play(Some(now - Duration::seconds(20)), false, now), "just now");
        assert_eq!(describe_play(Some(now + Duration::seconds(20)), false, now), "just now");
    }

    #[test]
    fn test_minutes_singular_and_plural() {
        let now = at(15, 12, 0);
        assert_eq!(describe_play(Some(at(15, 11, 59)), false, now), "1 minute ago");
        assert_eq!(describe_play(Some(at(15, 11, 20)), false, now), "40 minutes ago");
    }

    #[test]
    fn test_same_day_and_yesterday() {
        let now = at(15, 22, 0);
        assert_eq!(describe_play(Some(at(15, 9, 5)), false, now), "today at 09:05");
        assert_eq!(describe_play(Some(at(14, 23, 30)), false, now), "yesterday at 23:30");
    }

    #[test]
    fn test_within_week_names_weekday() {
        // 2024-03-11 was a Monday
        assert_eq!(
            describe_play(Some(at(11, 8, 0)), false, at(15, 12, 0)),
            "last Monday at 08:00"
        );
    }

    #[test]
    fn test_older_plays_show_date() {
        assert_eq!(describe_play(Some(at(1, 8, 0)), false, at(15, 12, 0)), "03/01/2024");
    }
}
