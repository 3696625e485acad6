//! Field normalization shared by the comparator and the back-fill step:
//! addresses, phones, websites, and opening hours.

use crate::domain::{PlaceRecord, Venue};

/// Street-suffix and directional abbreviations applied before address
/// comparison, lowercase on both sides.
const ADDRESS_ABBREVIATIONS: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("boulevard", "blvd"),
    ("road", "rd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("court", "ct"),
    ("place", "pl"),
    ("square", "sq"),
    ("highway", "hwy"),
    ("parkway", "pkwy"),
    ("suite", "ste"),
    ("apartment", "apt"),
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
];

/// Domains that identify a social-network profile rather than a venue
/// website.
const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
];

/// Lowercase, strip punctuation, and abbreviate street words.
pub fn normalize_address(address: &str) -> String {
    let lowered = address.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c == ',' || c == '.' || c == '#' { ' ' } else { c })
        .collect();
    cleaned
        .split_whitespace()
        .map(|word| {
            ADDRESS_ABBREVIATIONS
                .iter()
                .find(|(long, _)| *long == word)
                .map(|(_, short)| *short)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical phone form: `+` followed by digits only.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        String::new()
    } else {
        format!("+{digits}")
    }
}

/// Canonical website form: scheme dropped, `www.` stripped, no trailing
/// slash, lowercase.
pub fn normalize_website(url: &str) -> String {
    let mut rest = url.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(stripped) = rest.strip_prefix(scheme) {
            rest = stripped.to_string();
            break;
        }
    }
    if let Some(stripped) = rest.strip_prefix("www.") {
        rest = stripped.to_string();
    }
    rest.trim_end_matches('/').to_string()
}

/// Host part of a normalized website.
pub fn website_domain(url: &str) -> String {
    normalize_website(url)
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// True when the URL points at a social-network profile.
pub fn is_social_url(url: &str) -> bool {
    let domain = website_domain(url);
    SOCIAL_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

/// One weekday's opening range in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayHours {
    pub day: &'static str,
    pub start_minutes: u32,
    pub end_minutes: u32,
}

impl DayHours {
    /// Compact form used in submitted records: `Mon-11:00-21:00`.
    pub fn to_compact(self) -> String {
        format!(
            "{}-{:02}:{:02}-{:02}:{:02}",
            self.day,
            self.start_minutes / 60,
            self.start_minutes % 60,
            self.end_minutes / 60,
            self.end_minutes % 60
        )
    }
}

const DAYS: &[(&str, &str)] = &[
    ("monday", "Mon"),
    ("tuesday", "Tue"),
    ("wednesday", "Wed"),
    ("thursday", "Thu"),
    ("friday", "Fri"),
    ("saturday", "Sat"),
    ("sunday", "Sun"),
];

fn short_day(token: &str) -> Option<&'static str> {
    let lowered = token.to_lowercase();
    DAYS.iter()
        .find(|(long, short)| lowered == *long || lowered == short.to_lowercase())
        .map(|(_, short)| *short)
}

/// Parse one human-readable weekday line from the lookup service, e.g.
/// `"Monday: 11:00 AM – 9:00 PM"`. `"Open 24 hours"` maps to the full day;
/// `"Closed"` lines are dropped.
pub fn parse_weekday_line(line: &str) -> Option<DayHours> {
    let (day_part, hours_part) = line.split_once(':')?;
    let day = short_day(day_part.trim())?;
    let hours_part = hours_part.trim();

    if hours_part.eq_ignore_ascii_case("closed") {
        return None;
    }
    if hours_part.eq_ignore_ascii_case("open 24 hours") {
        return Some(DayHours {
            day,
            start_minutes: 0,
            end_minutes: 24 * 60,
        });
    }

    // Split on en dash, em dash, or hyphen; keep the first range.
    let mut parts = hours_part.splitn(2, ['–', '—', '-']);
    let start = parse_clock(parts.next()?.trim())?;
    let end = parse_clock(parts.next()?.trim())?;
    Some(DayHours {
        day,
        start_minutes: start,
        end_minutes: end,
    })
}

/// Parse a compact submitted entry, `Mon-11:00-21:00`.
pub fn parse_compact_entry(entry: &str) -> Option<DayHours> {
    let mut parts = entry.trim().splitn(3, '-');
    let day = short_day(parts.next()?)?;
    let start = parse_clock(parts.next()?)?;
    let end = parse_clock(parts.next()?)?;
    Some(DayHours {
        day,
        start_minutes: start,
        end_minutes: end,
    })
}

/// Parse whatever hours representation a side carries: compact entries
/// separated by `;` or `,`, or weekday-text lines.
pub fn parse_hours(entries: &[String]) -> Vec<DayHours> {
    let mut parsed = Vec::new();
    for entry in entries {
        for piece in entry.split([';', '\n']) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            if let Some(hours) = parse_compact_entry(piece).or_else(|| parse_weekday_line(piece)) {
                parsed.push(hours);
            }
        }
    }
    parsed
}

/// `"11:00 AM"`, `"9 PM"`, `"21:00"`, or `"24:00"` to minutes since
/// midnight.
fn parse_clock(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let lowered = raw.to_lowercase();
    let (time_part, meridiem) = if let Some(t) = lowered.strip_suffix("am") {
        (t.trim().to_string(), Some(false))
    } else if let Some(t) = lowered.strip_suffix("pm") {
        (t.trim().to_string(), Some(true))
    } else {
        (lowered, None)
    };

    let (hours, minutes) = match time_part.split_once(':') {
        Some((h, m)) => (h.trim().parse::<u32>().ok()?, m.trim().parse::<u32>().ok()?),
        None => (time_part.trim().parse::<u32>().ok()?, 0),
    };
    if minutes >= 60 {
        return None;
    }

    let hours = match meridiem {
        Some(true) if hours < 12 => hours + 12,
        Some(false) if hours == 12 => 0,
        _ => hours,
    };
    if hours > 24 || (hours == 24 && minutes != 0) {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Render looked-up weekday text into the compact submitted format.
pub fn weekday_text_to_compact(weekday_text: &[String]) -> Vec<String> {
    weekday_text
        .iter()
        .filter_map(|line| parse_weekday_line(line))
        .map(DayHours::to_compact)
        .collect()
}

/// Back-fill missing submitted fields from the looked-up place. The
/// submitted values always win when present; a looked-up website that is a
/// social profile lands in the social URL field instead.
pub fn backfill_from_place(venue: &Venue, place: &PlaceRecord) -> Venue {
    let mut filled = venue.clone();

    if filled.phone.as_deref().map(str::trim).unwrap_or("").is_empty() {
        if let Some(phone) = &place.formatted_phone {
            filled.phone = Some(normalize_phone(phone));
        }
    }

    if filled.url.as_deref().map(str::trim).unwrap_or("").is_empty() {
        if let Some(website) = &place.website {
            if is_social_url(website) {
                if filled
                    .social_url
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or("")
                    .is_empty()
                {
                    filled.social_url = Some(website.clone());
                }
            } else {
                filled.url = Some(website.clone());
            }
        }
    }

    if filled.coordinates().is_none() {
        if let Some(location) = place.location {
            filled.lat = Some(location.lat);
            filled.lng = Some(location.lng);
        }
    }

    if filled
        .zipcode
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
        if let Some(zip) = place.postal_code() {
            filled.zipcode = Some(zip.to_string());
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::place::test_place;
    use crate::domain::venue::test_venue;

    #[test]
    fn test_normalize_address_abbreviates() {
        assert_eq!(
            normalize_address("123 Vegan Street, Portland"),
            "123 vegan st portland"
        );
        assert_eq!(
            normalize_address("45 North Oak Avenue"),
            "45 n oak ave"
        );
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("(503) 555-0100"), "+5035550100");
        assert_eq!(normalize_phone("+1 503 555 0100"), "+15035550100");
        assert_eq!(normalize_phone("no digits"), "");
    }

    #[test]
    fn test_normalize_website() {
        assert_eq!(
            normalize_website("https://www.GreenLeaf.example.com/"),
            "greenleaf.example.com"
        );
        assert_eq!(
            normalize_website("http://greenleaf.example.com/menu/"),
            "greenleaf.example.com/menu"
        );
    }

    #[test]
    fn test_social_url_detection() {
        assert!(is_social_url("https://www.facebook.com/greenleaf"));
        assert!(is_social_url("https://m.instagram.com/greenleaf"));
        assert!(!is_social_url("https://greenleaf.example.com"));
    }

    #[test]
    fn test_parse_weekday_line_round_trip() {
        let parsed = parse_weekday_line("Monday: 11:00 AM – 9:00 PM").unwrap();
        assert_eq!(parsed.to_compact(), "Mon-11:00-21:00");
    }

    #[test]
    fn test_parse_open_24_hours() {
        let parsed = parse_weekday_line("Tuesday: Open 24 hours").unwrap();
        assert_eq!(parsed.to_compact(), "Tue-00:00-24:00");
    }

    #[test]
    fn test_closed_lines_are_dropped() {
        assert!(parse_weekday_line("Sunday: Closed").is_none());
    }

    #[test]
    fn test_parse_clock_edges() {
        assert_eq!(parse_clock("12:00 AM"), Some(0));
        assert_eq!(parse_clock("12:30 PM"), Some(12 * 60 + 30));
        assert_eq!(parse_clock("9 PM"), Some(21 * 60));
        assert_eq!(parse_clock("24:00"), Some(24 * 60));
        assert_eq!(parse_clock("24:30"), None);
        assert_eq!(parse_clock("9:75"), None);
    }

    #[test]
    fn test_parse_compact_entry() {
        let parsed = parse_compact_entry("Mon-11:00-21:00").unwrap();
        assert_eq!(parsed.day, "Mon");
        assert_eq!(parsed.start_minutes, 11 * 60);
        assert_eq!(parsed.end_minutes, 21 * 60);
    }

    #[test]
    fn test_parse_hours_mixed_input() {
        let entries = vec![
            "Mon-11:00-21:00; Tue-11:00-21:00".to_string(),
            "Wednesday: 10:00 AM – 8:00 PM".to_string(),
        ];
        let parsed = parse_hours(&entries);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[2].to_compact(), "Wed-10:00-20:00");
    }

    #[test]
    fn test_backfill_fills_only_missing_fields() {
        let mut venue = test_venue(1);
        venue.phone = None;
        venue.zipcode = None;
        let original_url = venue.url.clone();
        let place = test_place();

        let filled = backfill_from_place(&venue, &place);
        assert_eq!(filled.phone.as_deref(), Some("+5035550100"));
        assert_eq!(filled.zipcode.as_deref(), Some("97201"));
        // Submitted URL was present and must survive.
        assert_eq!(filled.url, original_url);
    }

    #[test]
    fn test_backfill_routes_social_website() {
        let mut venue = test_venue(1);
        venue.url = None;
        venue.social_url = None;
        let mut place = test_place();
        place.website = Some("https://www.facebook.com/greenleaf".to_string());

        let filled = backfill_from_place(&venue, &place);
        assert!(filled.url.is_none());
        assert_eq!(
            filled.social_url.as_deref(),
            Some("https://www.facebook.com/greenleaf")
        );
    }

    #[test]
    fn test_backfill_coordinates() {
        let mut venue = test_venue(1);
        venue.lat = None;
        venue.lng = None;
        let place = test_place();
        let filled = backfill_from_place(&venue, &place);
        assert_eq!(filled.lat, Some(40.0003));
    }
}
