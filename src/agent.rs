//! User-agent parsing seam.
//!
//! The core consumes parsed browser/OS/device-type fields; unknown fields
//! stay `None`. [`BasicUserAgentParser`] is a small heuristic default, meant
//! to be swapped for a full parser behind the same trait.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Endpoint form factor, as derived from the user agent or set on a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
    Other,
    Unknown,
}

/// Parsed user-agent breakdown stored with session tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<DeviceType>,
}

pub trait UserAgentParser: Send + Sync {
    fn parse(&self, raw: &str) -> UserAgentInfo;
}

/// Regex-based fallback parser covering the mainstream browser families.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicUserAgentParser;

impl UserAgentParser for BasicUserAgentParser {
    fn parse(&self, raw: &str) -> UserAgentInfo {
        let raw = raw.trim();
        if raw.is_empty() {
            return UserAgentInfo::default();
        }
        let (browser, browser_version) = browser_of(raw);
        let (os, os_version) = os_of(raw);
        let device_type = device_type_of(raw, browser.is_some() || os.is_some());
        UserAgentInfo {
            browser,
            browser_version,
            os,
            os_version,
            device_type,
        }
    }
}

// Order matters: Chrome UAs contain "Safari", Edge UAs contain "Chrome".
const BROWSER_TOKENS: &[(&str, &str)] = &[
    ("Firefox", r"Firefox/(\d+(?:\.\d+)*)"),
    ("Edge", r"Edg(?:e|A|iOS)?/(\d+(?:\.\d+)*)"),
    ("Opera", r"OPR/(\d+(?:\.\d+)*)"),
    ("Chrome", r"Chrome/(\d+(?:\.\d+)*)"),
    ("Safari", r"Version/(\d+(?:\.\d+)*) .*Safari/"),
];

const OS_TOKENS: &[(&str, &str)] = &[
    ("Windows", r"Windows NT (\d+(?:\.\d+)*)"),
    ("Android", r"Android (\d+(?:\.\d+)*)"),
    ("iOS", r"(?:iPhone|CPU) OS (\d+(?:_\d+)*)"),
    ("macOS", r"Mac OS X (\d+(?:[._]\d+)*)"),
    ("Linux", r"(Linux)"),
];

fn browser_of(raw: &str) -> (Option<String>, Option<String>) {
    for (name, pattern) in BROWSER_TOKENS {
        let version = Regex::new(pattern)
            .ok()
            .and_then(|regex| regex.captures(raw))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string());
        if let Some(version) = version {
            return (Some((*name).to_string()), Some(version));
        }
    }
    (None, None)
}

fn os_of(raw: &str) -> (Option<String>, Option<String>) {
    for (name, pattern) in OS_TOKENS {
        let matched = Regex::new(pattern)
            .ok()
            .and_then(|regex| regex.captures(raw))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().replace('_', "."));
        if matched.is_some() {
            let version = matched.filter(|_| *name != "Linux");
            return (Some((*name).to_string()), version);
        }
    }
    (None, None)
}

fn device_type_of(raw: &str, recognized: bool) -> Option<DeviceType> {
    if raw.contains("iPad") || raw.contains("Tablet") {
        Some(DeviceType::Tablet)
    } else if raw.contains("Mobi") || raw.contains("iPhone") {
        Some(DeviceType::Mobile)
    } else if raw.contains("Android") {
        // Android without a Mobile marker is a tablet form factor.
        Some(DeviceType::Tablet)
    } else if recognized {
        Some(DeviceType::Desktop)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{BasicUserAgentParser, DeviceType, UserAgentInfo, UserAgentParser};

    const DESKTOP_FIREFOX: &str =
        "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:41.0) Gecko/20100101 Firefox/41.0";
    const MOBILE_FIREFOX: &str =
        "Mozilla/5.0 (Android 4.4; Mobile; rv:41.0) Gecko/41.0 Firefox/41.0";

    #[test]
    fn parses_desktop_firefox() {
        let info = BasicUserAgentParser.parse(DESKTOP_FIREFOX);
        assert_eq!(info.browser.as_deref(), Some("Firefox"));
        assert_eq!(info.browser_version.as_deref(), Some("41.0"));
        assert_eq!(info.os.as_deref(), Some("Windows"));
        assert_eq!(info.os_version.as_deref(), Some("6.1"));
        assert_eq!(info.device_type, Some(DeviceType::Desktop));
    }

    #[test]
    fn parses_mobile_firefox() {
        let info = BasicUserAgentParser.parse(MOBILE_FIREFOX);
        assert_eq!(info.browser.as_deref(), Some("Firefox"));
        assert_eq!(info.os.as_deref(), Some("Android"));
        assert_eq!(info.os_version.as_deref(), Some("4.4"));
        assert_eq!(info.device_type, Some(DeviceType::Mobile));
    }

    #[test]
    fn chrome_wins_over_embedded_safari_token() {
        let raw = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                   (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        let info = BasicUserAgentParser.parse(raw);
        assert_eq!(info.browser.as_deref(), Some("Chrome"));
        assert_eq!(info.os.as_deref(), Some("macOS"));
        assert_eq!(info.os_version.as_deref(), Some("10.15.7"));
    }

    #[test]
    fn ipad_is_a_tablet() {
        let raw = "Mozilla/5.0 (iPad; CPU OS 9_3_2 like Mac OS X) AppleWebKit/601.1.46 \
                   (KHTML, like Gecko) Version/9.0 Mobile/13F69 Safari/601.1";
        let info = BasicUserAgentParser.parse(raw);
        assert_eq!(info.device_type, Some(DeviceType::Tablet));
        assert_eq!(info.os.as_deref(), Some("iOS"));
        assert_eq!(info.os_version.as_deref(), Some("9.3.2"));
    }

    #[test]
    fn unknown_agent_yields_absent_fields() {
        assert_eq!(BasicUserAgentParser.parse("curl/8.0"), UserAgentInfo::default());
        assert_eq!(BasicUserAgentParser.parse("   "), UserAgentInfo::default());
    }
}
