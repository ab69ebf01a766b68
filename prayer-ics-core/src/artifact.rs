use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::{CalendarArtifact, IcsOptions, PrayerEvent, Result, ics::IcsGenerator};

/// 存储模式下产物对外的路径前缀
pub const PUBLIC_ROUTE: &str = "/calendars";

/// 产物交付方式
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode")]
pub enum DeliveryMode {
    /// 直接返回ICS内容
    #[default]
    Inline,
    /// 写入可公开访问的目录并返回链接
    Stored {
        dir: PathBuf,
        public_base_url: Option<String>,
    },
}

/// Only the mode name; a stored directory comes from separate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Inline,
    Stored,
}

impl FromStr for DeliveryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "stored" | "file" => Ok(Self::Stored),
            other => Err(format!(
                "unknown delivery mode '{}', expected inline or stored",
                other
            )),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Stored { dir, .. } => write!(f, "stored ({})", dir.display()),
        }
    }
}

/// 日历产物构建器
pub struct ArtifactBuilder {
    mode: DeliveryMode,
    generator: IcsGenerator,
}

impl ArtifactBuilder {
    pub fn new(mode: DeliveryMode, options: IcsOptions) -> Self {
        Self {
            mode,
            generator: IcsGenerator::new(options),
        }
    }

    /// 未配置公开地址时使用的后备地址（通常由请求的 Host 推导）
    pub fn with_fallback_base_url(mut self, base_url: impl Into<String>) -> Self {
        if let DeliveryMode::Stored {
            ref mut public_base_url,
            ..
        } = self.mode
        {
            if public_base_url.is_none() {
                *public_base_url = Some(base_url.into());
            }
        }
        self
    }

    /// 生成ICS并按交付方式产出
    ///
    /// 编码失败时直接返回错误，不会写入任何文件。
    pub async fn build(&self, events: &[PrayerEvent]) -> Result<CalendarArtifact> {
        let content = self.generator.generate(events)?;

        match self.mode {
            DeliveryMode::Inline => Ok(CalendarArtifact::Inline {
                content,
                message: format!("Generated calendar with {} prayer events", events.len()),
            }),
            DeliveryMode::Stored {
                ref dir,
                ref public_base_url,
            } => {
                let path = write_once(dir, &content).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let locator = match public_base_url {
                    Some(base) => format!("{}/{}", base.trim_end_matches('/'), file_name),
                    None => format!("{}/{}", PUBLIC_ROUTE, file_name),
                };

                tracing::info!("ICS文件已保存到: {}", path.display());

                Ok(CalendarArtifact::Stored {
                    locator,
                    path,
                    message: format!("Calendar with {} prayer events is ready", events.len()),
                })
            }
        }
    }
}

/// 生成不会与并发请求冲突的文件名
pub fn unique_file_name() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!(
        "prayer-times-{}-{}.ics",
        Utc::now().format("%Y%m%dT%H%M%S%9f"),
        &uuid[..8]
    )
}

async fn write_once(dir: &Path, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;

    let path = dir.join(unique_file_name());
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::NormalizedMoment;

    fn events() -> Vec<PrayerEvent> {
        vec![PrayerEvent {
            title: "Fajr".to_string(),
            moment: NormalizedMoment {
                year: 2025,
                month: 1,
                day: 1,
                hour: 5,
                minute: 30,
            },
            description: "Fajr prayer time for Cairo".to_string(),
        }]
    }

    #[tokio::test]
    async fn inline_mode_returns_content() {
        let builder = ArtifactBuilder::new(DeliveryMode::Inline, IcsOptions::default());

        let artifact = assert_ok!(builder.build(&events()).await);
        match artifact {
            CalendarArtifact::Inline { content, message } => {
                assert!(content.contains("SUMMARY:Fajr"));
                assert!(message.contains('1'));
            }
            other => panic!("unexpected artifact: {:?}", other),
        }

        let empty = assert_ok!(builder.build(&[]).await);
        assert!(matches!(empty, CalendarArtifact::Inline { ref content, .. } if content.contains("END:VCALENDAR")));
    }

    #[tokio::test]
    async fn stored_mode_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ArtifactBuilder::new(
            DeliveryMode::Stored {
                dir: dir.path().to_path_buf(),
                public_base_url: None,
            },
            IcsOptions::default(),
        )
        .with_fallback_base_url("http://localhost:3000/calendars/");

        let first = assert_ok!(builder.build(&events()).await);
        let second = assert_ok!(builder.build(&[]).await);

        let (CalendarArtifact::Stored { locator: l1, path: p1, .. }, CalendarArtifact::Stored { locator: l2, path: p2, .. }) =
            (first, second)
        else {
            panic!("expected stored artifacts");
        };

        assert_ne!(p1, p2);
        assert!(l1.starts_with("http://localhost:3000/calendars/prayer-times-"));
        assert!(l1.ends_with(".ics"));
        assert_ne!(l1, l2);

        let written = std::fs::read_to_string(&p1).unwrap();
        assert!(written.contains("SUMMARY:Fajr"));
        assert!(std::fs::read_to_string(&p2).unwrap().contains("BEGIN:VCALENDAR"));
    }

    #[tokio::test]
    async fn configured_base_url_wins_over_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ArtifactBuilder::new(
            DeliveryMode::Stored {
                dir: dir.path().to_path_buf(),
                public_base_url: Some("https://cdn.example.org/ics".to_string()),
            },
            IcsOptions::default(),
        )
        .with_fallback_base_url("http://ignored");

        let artifact = assert_ok!(builder.build(&events()).await);
        assert!(matches!(
            artifact,
            CalendarArtifact::Stored { ref locator, .. } if locator.starts_with("https://cdn.example.org/ics/prayer-times-")
        ));
    }

    #[tokio::test]
    async fn locator_without_any_base_is_relative_route() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ArtifactBuilder::new(
            DeliveryMode::Stored {
                dir: dir.path().to_path_buf(),
                public_base_url: None,
            },
            IcsOptions::default(),
        );

        let artifact = assert_ok!(builder.build(&events()).await);
        let CalendarArtifact::Stored { locator, path, .. } = artifact else {
            panic!("expected stored artifact");
        };
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(locator, format!("/calendars/{}", file_name));
        assert!(!locator.contains(&*dir.path().to_string_lossy()));
    }

    #[tokio::test]
    async fn build_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ArtifactBuilder::new(
            DeliveryMode::Stored {
                dir: dir.path().to_path_buf(),
                public_base_url: None,
            },
            IcsOptions::default(),
        );

        let mut bad = events();
        bad[0].moment.hour = 99;
        assert_err!(builder.build(&bad).await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn delivery_kind_parses() {
        assert_eq!("stored".parse::<DeliveryKind>(), Ok(DeliveryKind::Stored));
        assert_eq!("INLINE".parse::<DeliveryKind>(), Ok(DeliveryKind::Inline));
        assert!("email".parse::<DeliveryKind>().is_err());
    }

    #[test]
    fn file_names_differ() {
        assert_ne!(unique_file_name(), unique_file_name());
    }
}
