//! Attendance record assembly and wire format

use crate::photo::StillImage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Location as recorded; `address` absent means raw coordinates only
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// User agent and platform of the submitting device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    pub fn new(user_agent: &str, platform: Option<&str>) -> Self {
        let user_agent = match user_agent.trim() {
            "" => "unknown",
            ua => ua,
        };
        match platform.map(str::trim).filter(|p| !p.is_empty()) {
            Some(platform) => Self(format!("{} ({})", user_agent, platform)),
            None => Self(user_agent.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Finalized output of one successful verification session
///
/// Produced exactly once per submission and handed to the completion
/// callback; the orchestrator keeps no copy.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub qr_code: String,
    pub location: RecordLocation,
    pub timestamp: DateTime<Utc>,
    pub photo: Option<StillImage>,
    pub device_fingerprint: String,
    /// `None` when IP lookup is disabled; `"unknown"` when it failed
    pub source_ip: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord<'a> {
    qr_code: &'a str,
    location: WireLocation<'a>,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo: Option<String>,
    device_info: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<&'a str>,
}

#[derive(Serialize)]
struct WireLocation<'a> {
    lat: f64,
    lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
}

impl Serialize for AttendanceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRecord {
            qr_code: &self.qr_code,
            location: WireLocation {
                lat: self.location.latitude,
                lng: self.location.longitude,
                address: self.location.address.as_deref(),
            },
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            photo: self.photo.as_ref().map(|p| STANDARD.encode(&p.bytes)),
            device_info: &self.device_fingerprint,
            ip_address: self.source_ip.as_deref(),
        }
        .serialize(serializer)
    }
}
