//! Recognized series fields and where they come from
//!
//! Instance-store disk metrics are stored as `Eph*`; the `Disk*` fields
//! hold the sum of the instance's attached volume metrics.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricField {
    #[serde(rename = "CPUUtilization")]
    CpuUtilization,
    NetworkIn,
    NetworkOut,
    EphReadOps,
    EphWriteOps,
    EphReadBytes,
    EphWriteBytes,
    DiskReadOps,
    DiskWriteOps,
    DiskReadBytes,
    DiskWriteBytes,
}

impl MetricField {
    pub const ALL: [MetricField; 11] = [
        MetricField::CpuUtilization,
        MetricField::NetworkIn,
        MetricField::NetworkOut,
        MetricField::EphReadOps,
        MetricField::EphWriteOps,
        MetricField::EphReadBytes,
        MetricField::EphWriteBytes,
        MetricField::DiskReadOps,
        MetricField::DiskWriteOps,
        MetricField::DiskReadBytes,
        MetricField::DiskWriteBytes,
    ];

    /// Name of the series this field is stored under
    pub fn series_name(&self) -> &'static str {
        match self {
            Self::CpuUtilization => "CPUUtilization",
            Self::NetworkIn => "NetworkIn",
            Self::NetworkOut => "NetworkOut",
            Self::EphReadOps => "EphReadOps",
            Self::EphWriteOps => "EphWriteOps",
            Self::EphReadBytes => "EphReadBytes",
            Self::EphWriteBytes => "EphWriteBytes",
            Self::DiskReadOps => "DiskReadOps",
            Self::DiskWriteOps => "DiskWriteOps",
            Self::DiskReadBytes => "DiskReadBytes",
            Self::DiskWriteBytes => "DiskWriteBytes",
        }
    }

    pub fn from_series_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.series_name() == name)
    }

    /// Provider metric the field is read from
    pub fn source_metric(&self) -> &'static str {
        match self {
            Self::CpuUtilization => "CPUUtilization",
            Self::NetworkIn => "NetworkIn",
            Self::NetworkOut => "NetworkOut",
            Self::EphReadOps => "DiskReadOps",
            Self::EphWriteOps => "DiskWriteOps",
            Self::EphReadBytes => "DiskReadBytes",
            Self::EphWriteBytes => "DiskWriteBytes",
            Self::DiskReadOps => "VolumeReadOps",
            Self::DiskWriteOps => "VolumeWriteOps",
            Self::DiskReadBytes => "VolumeReadBytes",
            Self::DiskWriteBytes => "VolumeWriteBytes",
        }
    }

    /// Derived from attached volumes rather than read per instance
    pub fn is_volume_rollup(&self) -> bool {
        matches!(
            self,
            Self::DiskReadOps | Self::DiskWriteOps | Self::DiskReadBytes | Self::DiskWriteBytes
        )
    }

    /// Field for a metric reported under an instance dimension
    pub fn from_instance_metric(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| !f.is_volume_rollup() && f.source_metric() == name)
    }

    /// Field for a metric reported under a volume dimension
    pub fn from_volume_metric(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.is_volume_rollup() && f.source_metric() == name)
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.series_name())
    }
}

/// Every recognized series name, for configuring the store
pub fn series_names() -> impl Iterator<Item = &'static str> {
    MetricField::ALL.into_iter().map(|f| f.series_name())
}
