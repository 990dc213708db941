//! Container catalog: the inter-module schema.
//!
//! Tags are part of the contract between modules. New tags may be added
//! freely; renaming or removing one breaks every module that consumes it.

use crate::container::{ContainerKind, CustomContainer};
use crate::dataset::{DataFrame, DataTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub(crate) type Decoder = fn(Value) -> Result<Payload, serde_json::Error>;

fn decode_as<T>(fields: Value) -> Result<Payload, serde_json::Error>
where
    T: ContainerKind + for<'de> Deserialize<'de>,
{
    serde_json::from_value::<T>(fields).map(T::into_payload)
}

macro_rules! container_catalog {
    ($($variant:ident($ty:ty) => $tag:literal,)+) => {
        /// Every container variant the kernel knows about, plus
        /// [`CustomContainer`] for runtime-registered tags.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Payload {
            $($variant($ty),)+
            Custom(CustomContainer),
        }

        impl Payload {
            pub fn type_tag(&self) -> &str {
                match self {
                    $(Payload::$variant(_) => $tag,)+
                    Payload::Custom(c) => &c.tag,
                }
            }

            /// Variant fields as JSON.
            pub fn fields(&self) -> Value {
                let encoded = match self {
                    $(Payload::$variant(v) => serde_json::to_value(v),)+
                    Payload::Custom(c) => Ok(c.body.clone()),
                };
                encoded.unwrap_or(Value::Null)
            }
        }

        impl fmt::Display for Payload {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Payload::$variant(v) => fmt::Display::fmt(v, f),)+
                    Payload::Custom(c) => fmt::Display::fmt(c, f),
                }
            }
        }

        $(
            impl ContainerKind for $ty {
                const TYPE_TAG: &'static str = $tag;

                fn into_payload(self) -> Payload {
                    Payload::$variant(self)
                }

                fn from_payload(payload: &Payload) -> Option<&Self> {
                    match payload {
                        Payload::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn from_payload_mut(payload: &mut Payload) -> Option<&mut Self> {
                    match payload {
                        Payload::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )+

        /// Tags of every catalog variant.
        pub const CATALOG_TAGS: &[&str] = &[$($tag,)+];

        pub(crate) fn catalog_decoders() -> Vec<(&'static str, Decoder)> {
            vec![$(($tag, decode_as::<$ty> as Decoder),)+]
        }
    };
}

container_catalog! {
    FsPath(FsPath) => "fspath",
    RemoteFsPath(RemoteFsPath) => "remotefspath",
    Report(Report) => "report",
    GcpLogs(GcpLogs) => "gcp_logs",
    ThreatIntelligence(ThreatIntelligence) => "threat_intelligence",
    YaraRule(YaraRule) => "yara_rule",
    TicketAttribute(TicketAttribute) => "ticketattribute",
    File(File) => "file",
    Directory(Directory) => "directory",
    ForensicsVm(ForensicsVm) => "forensics_vm",
    Url(Url) => "url",
    GceDisk(GceDisk) => "gcedisk",
    GceImage(GceImage) => "gceimage",
    DataFrame(DataFrameContainer) => "data_frame",
    Host(Host) => "host",
    GrrFlow(GrrFlow) => "grr_flow",
    WorkspaceLogs(WorkspaceLogs) => "workspace_logs",
    GcsObject(GcsObject) => "gcs_object",
    AwsS3Object(AwsS3Object) => "aws_s3_object",
    AwsVolume(AwsVolume) => "aws_volume",
    AwsSnapshot(AwsSnapshot) => "aws_snapshot",
    OsqueryQuery(OsqueryQuery) => "osquery_query",
    OsqueryResult(OsqueryResult) => "osquery_result",
    BigQueryQuery(BigQueryQuery) => "bigquery_query",
    SqlQuery(SqlQuery) => "sql_query",
    Telemetry(Telemetry) => "telemetry",
    TurbiniaRequest(TurbiniaRequest) => "turbiniarequest",
    GrrArtifact(GrrArtifact) => "grr_artifact",
    TimesketchSavedSearch(TimesketchSavedSearch) => "timesketch_saved_search",
    TimesketchQuery(TimesketchQuery) => "timesketch_query",
    TimesketchEvents(TimesketchEvents) => "timesketch_events",
    TimesketchAggregation(TimesketchAggregation) => "timesketch_aggregation",
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FsPath {
    pub path: String,
}

impl FsPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// A path on another machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteFsPath {
    pub path: String,
    pub hostname: String,
}

impl RemoteFsPath {
    pub fn new(path: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hostname: hostname.into(),
        }
    }
}

impl fmt::Display for RemoteFsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl File {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.ends_with(&self.name) {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}/{}", self.path, self.name)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Directory {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: None,
        }
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Url {
    pub path: String,
}

impl Url {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

// ---------------------------------------------------------------------------
// Reports, intel, tickets
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    #[default]
    Plaintext,
    Markdown,
}

impl TextFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TextFormat::Plaintext => "txt",
            TextFormat::Markdown => "md",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub module_name: String,
    pub text: String,
    #[serde(default)]
    pub text_format: TextFormat,
}

impl Report {
    pub fn new(module_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            text: text.into(),
            text_format: TextFormat::default(),
        }
    }

    pub fn markdown(mut self) -> Self {
        self.text_format = TextFormat::Markdown;
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Report", self.module_name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreatIntelligence {
    pub name: String,
    #[serde(default)]
    pub indicator: Option<String>,
    pub path: String,
}

impl fmt::Display for ThreatIntelligence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.name,
            self.indicator.as_deref().unwrap_or("None"),
            self.path
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YaraRule {
    pub name: String,
    pub rule_text: String,
}

impl fmt::Display for YaraRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketAttribute {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub value: String,
}

impl fmt::Display for TicketAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub key: String,
    pub value: String,
}

impl Telemetry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Telemetry<{}:{}>", self.key, self.value)
    }
}

// ---------------------------------------------------------------------------
// Hosts and remote agents
// ---------------------------------------------------------------------------

fn unknown_platform() -> String {
    "unknown".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    /// One of `win`, `linux`, `macos`, `unknown`.
    #[serde(default = "unknown_platform")]
    pub platform: String,
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            platform: unknown_platform(),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hostname)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrrFlow {
    pub hostname: String,
    pub flow_id: String,
}

impl fmt::Display for GrrFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.flow_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrrArtifact {
    pub name: String,
}

impl fmt::Display for GrrArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForensicsVm {
    pub name: String,
    /// Identifier of the disk holding the evidence.
    #[serde(default)]
    pub evidence_disk: Option<String>,
    /// One of `gcp`, `aws`, `azure`.
    pub platform: String,
}

impl fmt::Display for ForensicsVm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurbiniaRequest {
    pub project: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub evidence_name: Option<String>,
}

impl fmt::Display for TurbiniaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self
            .request_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or(self.evidence_name.as_deref())
            .unwrap_or_default();
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Cloud objects
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GceDisk {
    pub name: String,
    pub project: String,
}

impl GceDisk {
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for GceDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GceImage {
    pub name: String,
    pub project: String,
}

impl fmt::Display for GceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.name)
    }
}

/// Raw wire form of an object-storage container before scheme normalisation.
#[derive(Deserialize)]
pub struct ObjectPath {
    pub path: String,
}

fn with_scheme(path: String, scheme: &str) -> String {
    if path.starts_with(scheme) {
        path
    } else {
        format!("{}{}", scheme, path)
    }
}

/// Object-storage URI, always `gs://`-prefixed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ObjectPath")]
pub struct GcsObject {
    pub path: String,
}

impl GcsObject {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: with_scheme(path.into(), "gs://"),
        }
    }
}

impl From<ObjectPath> for GcsObject {
    fn from(raw: ObjectPath) -> Self {
        Self::new(raw.path)
    }
}

impl fmt::Display for GcsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Object-storage URI, always `s3://`-prefixed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ObjectPath")]
pub struct AwsS3Object {
    pub path: String,
}

impl AwsS3Object {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: with_scheme(path.into(), "s3://"),
        }
    }
}

impl From<ObjectPath> for AwsS3Object {
    fn from(raw: ObjectPath) -> Self {
        Self::new(raw.path)
    }
}

impl fmt::Display for AwsS3Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwsVolume {
    pub id: String,
}

impl fmt::Display for AwsVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwsSnapshot {
    pub id: String,
}

impl fmt::Display for AwsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GcpLogs {
    pub path: String,
    pub filter_expression: String,
    pub project_name: String,
}

impl fmt::Display for GcpLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_name, self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceLogs {
    pub application_name: String,
    pub path: String,
    pub filter_expression: String,
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl fmt::Display for WorkspaceLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.application_name, self.path)
    }
}

// ---------------------------------------------------------------------------
// Queries and their results
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OsqueryQuery {
    pub query: String,
    #[serde(default)]
    pub configuration_content: String,
    #[serde(default)]
    pub configuration_path: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Any of `darwin`, `linux`, `windows`.
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_collection_columns: Vec<String>,
}

impl OsqueryQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for OsqueryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("None"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OsqueryResult {
    #[serde(flatten)]
    pub frame: DataFrame,
    pub hostname: String,
    pub query: String,
    #[serde(default)]
    pub client_identifier: Option<String>,
    #[serde(default)]
    pub flow_identifier: Option<String>,
}

impl fmt::Display for OsqueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.frame.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BigQueryQuery {
    pub query: String,
    pub description: String,
    /// Keep results in memory rather than writing them to disk.
    pub pandas_output: bool,
}

impl fmt::Display for BigQueryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub query: String,
    pub description: String,
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Plain `data_frame` container: the dataset base on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataFrameContainer {
    #[serde(flatten)]
    pub frame: DataFrame,
}

impl From<DataFrame> for DataFrameContainer {
    fn from(frame: DataFrame) -> Self {
        Self { frame }
    }
}

impl fmt::Display for DataFrameContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.frame.name)
    }
}

// ---------------------------------------------------------------------------
// Timesketch
// ---------------------------------------------------------------------------

fn five() -> i64 {
    5
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimesketchSavedSearch {
    pub name: String,
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default = "five")]
    pub minutes_before: i64,
    #[serde(default = "five")]
    pub minutes_after: i64,
}

impl TimesketchSavedSearch {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            query: query.into(),
            date: None,
            minutes_before: five(),
            minutes_after: five(),
        }
    }
}

impl fmt::Display for TimesketchSavedSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A saved search together with the results it produced in a sketch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimesketchQuery {
    #[serde(flatten)]
    pub search: TimesketchSavedSearch,
    #[serde(default)]
    pub sketch_url: Option<String>,
    #[serde(default)]
    pub results: Option<DataTable>,
}

impl From<TimesketchSavedSearch> for TimesketchQuery {
    fn from(search: TimesketchSavedSearch) -> Self {
        Self {
            search,
            sketch_url: None,
            results: None,
        }
    }
}

impl fmt::Display for TimesketchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.search.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimesketchEvents {
    #[serde(flatten)]
    pub frame: DataFrame,
    pub query: String,
    pub sketch_id: i64,
}

impl TimesketchEvents {
    pub fn new(
        table: DataTable,
        query: impl Into<String>,
        sketch_id: i64,
        description: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            frame: DataFrame::new(table, description, name).with_source("Timesketch"),
            query: query.into(),
            sketch_id,
        }
    }
}

impl fmt::Display for TimesketchEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TimesketchEvents(query:{}, sketch_id:{}, rows:{})>",
            self.query,
            self.sketch_id,
            self.frame.rows()
        )
    }
}

/// Distinct values of one column and how often each occurs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimesketchAggregation {
    pub name: String,
    pub key: String,
    pub description: String,
    #[serde(default)]
    pub results: BTreeMap<String, u64>,
}

impl fmt::Display for TimesketchAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TimesketchAggregation(name:{}, key:{}, rows:{})>",
            self.name,
            self.key,
            self.results.len()
        )
    }
}
