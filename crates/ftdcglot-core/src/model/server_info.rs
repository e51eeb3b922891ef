//! Host and build description taken from the capture's metadata document.
//!
//! mongod writes `{ start, buildInfo, getCmdLineOpts, hostInfo, end }` as the
//! `type = 0` document of every `metrics.*` file.

use serde::{Deserialize, Serialize};

use crate::bson::Document;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OsInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub os_type: String,
    pub version: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemInfo {
    pub cpu_arch: String,
    pub hostname: String,
    pub num_cores: i64,
    pub mem_size_mb: i64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct HostInfo {
    pub os: OsInfo,
    pub system: SystemInfo,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct BuildInfo {
    pub version: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ServerInfo {
    pub host_info: HostInfo,
    pub build_info: BuildInfo,
}

fn text(doc: &Document, path: &str) -> String {
    doc.lookup(path)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn number(doc: &Document, path: &str) -> i64 {
    doc.lookup(path).and_then(|v| v.as_i64()).unwrap_or(0)
}

impl ServerInfo {
    /// Reads the known fields; missing ones stay empty.
    pub fn from_metadata(doc: &Document) -> Self {
        Self {
            host_info: HostInfo {
                os: OsInfo {
                    name: text(doc, "hostInfo/os/name"),
                    os_type: text(doc, "hostInfo/os/type"),
                    version: text(doc, "hostInfo/os/version"),
                },
                system: SystemInfo {
                    cpu_arch: text(doc, "hostInfo/system/cpuArch"),
                    hostname: text(doc, "hostInfo/system/hostname"),
                    num_cores: number(doc, "hostInfo/system/numCores"),
                    mem_size_mb: number(doc, "hostInfo/system/memSizeMB"),
                },
            },
            build_info: BuildInfo {
                version: text(doc, "buildInfo/version"),
            },
        }
    }

    /// One-line description, e.g.
    /// `MongoDB v4.4.6 db01 (Ubuntu 20.04) 8 cores 32768 MB mem`.
    pub fn summary(&self) -> String {
        let sys = &self.host_info.system;
        format!(
            "MongoDB v{} {} ({}) {} cores {} MB mem",
            self.build_info.version, sys.hostname, self.host_info.os.name, sys.num_cores, sys.mem_size_mb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson::Value;

    fn metadata() -> Document {
        let system = Document::new()
            .with("hostname", Value::String("db01".into()))
            .with("cpuArch", Value::String("x86_64".into()))
            .with("numCores", Value::Int32(8))
            .with("memSizeMB", Value::Int64(32768));
        let os = Document::new()
            .with("type", Value::String("Linux".into()))
            .with("name", Value::String("Ubuntu".into()))
            .with("version", Value::String("20.04".into()));
        Document::new()
            .with(
                "buildInfo",
                Value::Document(Document::new().with("version", Value::String("4.4.6".into()))),
            )
            .with(
                "hostInfo",
                Value::Document(
                    Document::new()
                        .with("system", Value::Document(system))
                        .with("os", Value::Document(os)),
                ),
            )
    }

    #[test]
    fn test_from_metadata() {
        let info = ServerInfo::from_metadata(&metadata());
        assert_eq!(info.host_info.system.hostname, "db01");
        assert_eq!(info.host_info.system.num_cores, 8);
        assert_eq!(info.host_info.system.mem_size_mb, 32768);
        assert_eq!(info.host_info.os.os_type, "Linux");
        assert_eq!(info.build_info.version, "4.4.6");
        assert_eq!(
            info.summary(),
            "MongoDB v4.4.6 db01 (Ubuntu) 8 cores 32768 MB mem"
        );
    }

    #[test]
    fn test_missing_fields_stay_empty() {
        let info = ServerInfo::from_metadata(&Document::new());
        assert_eq!(info, ServerInfo::default());
    }
}
