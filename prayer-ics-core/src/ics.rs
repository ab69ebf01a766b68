use chrono::{Duration, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::{Error, IcsOptions, PrayerEvent, Result};

#[cfg(test)]
mod tests;

const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";
const MAX_LINE_OCTETS: usize = 75;

/// ICS日历生成器
pub struct IcsGenerator {
    options: IcsOptions,
}

impl IcsGenerator {
    pub fn new(options: IcsOptions) -> Self {
        Self { options }
    }

    /// 生成ICS日历内容
    ///
    /// 任一事件无法构成合法的日期时间时整体失败，不返回部分内容。
    pub fn generate(&self, events: &[PrayerEvent]) -> Result<String> {
        let mut ics_content = String::new();

        // ICS文件头部
        ics_content.push_str("BEGIN:VCALENDAR\r\n");
        ics_content.push_str("VERSION:2.0\r\n");
        ics_content.push_str("PRODID:-//Prayer ICS//Prayer Times Calendar//EN\r\n");
        ics_content.push_str("CALSCALE:GREGORIAN\r\n");
        ics_content.push_str("METHOD:PUBLISH\r\n");

        if let Some(ref name) = self.options.calendar_name {
            push_line(&mut ics_content, &format!("X-WR-CALNAME:{}", escape_text(name)));
        }

        let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        for event in events {
            self.add_prayer_event(&mut ics_content, event, &dtstamp)?;
        }

        // ICS文件尾部
        ics_content.push_str("END:VCALENDAR\r\n");

        Ok(ics_content)
    }

    /// 添加单个礼拜事件
    fn add_prayer_event(
        &self,
        ics_content: &mut String,
        event: &PrayerEvent,
        dtstamp: &str,
    ) -> Result<()> {
        let start = event.moment.to_naive_datetime().ok_or_else(|| {
            Error::IcsGeneration(format!(
                "'{}' has no valid start time: {:04}-{:02}-{:02} {:02}:{:02}",
                event.title,
                event.moment.year,
                event.moment.month,
                event.moment.day,
                event.moment.hour,
                event.moment.minute
            ))
        })?;
        let end = start + Duration::minutes(i64::from(self.options.event_duration_minutes));

        ics_content.push_str("BEGIN:VEVENT\r\n");
        push_line(ics_content, &format!("UID:{}@prayer-ics", Uuid::new_v4()));
        push_line(ics_content, &format!("DTSTAMP:{}", dtstamp));
        push_line(ics_content, &local_property("DTSTART", start));
        push_line(ics_content, &local_property("DTEND", end));
        push_line(ics_content, &format!("SUMMARY:{}", escape_text(&event.title)));

        if self.options.include_description {
            push_line(
                ics_content,
                &format!("DESCRIPTION:{}", escape_text(&event.description)),
            );
        }

        push_line(ics_content, "TRANSP:TRANSPARENT");

        // 添加提醒
        if let Some(reminder_minutes) = self.options.reminder_minutes {
            ics_content.push_str("BEGIN:VALARM\r\n");
            ics_content.push_str("ACTION:DISPLAY\r\n");
            push_line(ics_content, &format!("DESCRIPTION:{}", escape_text(&event.title)));
            push_line(ics_content, &format!("TRIGGER:-PT{}M", reminder_minutes));
            ics_content.push_str("END:VALARM\r\n");
        }

        ics_content.push_str("END:VEVENT\r\n");

        Ok(())
    }
}

/// 浮动本地时间，按事件所在地的墙上时间显示
fn local_property(name: &str, value: NaiveDateTime) -> String {
    format!("{}:{}", name, value.format(LOCAL_FORMAT))
}

impl Default for IcsGenerator {
    fn default() -> Self {
        Self::new(IcsOptions::default())
    }
}

/// 转义ICS文本内容
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// 按 RFC 5545 折行（75 字节），不拆分多字节字符
fn push_line(ics_content: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            ics_content.push_str("\r\n ");
            width = 1;
        }
        ics_content.push(ch);
        width += len;
    }
    ics_content.push_str("\r\n");
}
