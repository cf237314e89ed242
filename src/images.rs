use chrono::{NaiveDate, Utc};

use crate::types::ImageRecord;

/// Records sharing one calendar day, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup<'a> {
    pub date: Option<NaiveDate>,
    pub records: Vec<&'a ImageRecord>,
}

impl DateGroup<'_> {
    pub fn label(&self, today: NaiveDate) -> String {
        match self.date {
            Some(date) if date == today => "Recent".to_string(),
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => "Undated".to_string(),
        }
    }
}

/// Group history by the date part of `createdAt`, groups in order of first
/// appearance.
pub fn group_by_date(records: &[ImageRecord]) -> Vec<DateGroup<'_>> {
    let mut groups: Vec<DateGroup<'_>> = Vec::new();
    for record in records {
        let date = record.created_at.map(|t| t.date_naive());
        match groups.iter_mut().find(|g| g.date == date) {
            Some(group) => group.records.push(record),
            None => groups.push(DateGroup {
                date,
                records: vec![record],
            }),
        }
    }
    groups
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Which of a record's urls is on show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carousel {
    pub record_id: String,
    pub urls: Vec<String>,
    index: usize,
}

impl Carousel {
    pub fn new(record_id: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            record_id: record_id.into(),
            urls,
            index: 0,
        }
    }

    #[cfg(test)]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&str> {
        self.urls.get(self.index).map(String::as_str)
    }

    pub fn next(&mut self) {
        if !self.urls.is_empty() {
            self.index = (self.index + 1) % self.urls.len();
        }
    }

    pub fn prev(&mut self) {
        let n = self.urls.len();
        if n > 0 {
            self.index = (self.index + n - 1) % n;
        }
    }
}
