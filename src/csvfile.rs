use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::schedule::{PeriodSlot, Weekday, MAX_WEEK, MIN_WEEK};
use crate::store::Course;

/// Column order of the exchange file. One line per scheduled slot.
pub const HEADER: &str = "name,teacher,day,period,location,week";

#[derive(Debug, Clone, PartialEq)]
pub struct CsvCourse {
    pub name: String,
    pub teacher: String,
    pub day: Weekday,
    pub period: PeriodSlot,
    pub location: String,
    pub week: u8,
}

pub fn write_courses(path: &Path, courses: &[Course]) -> anyhow::Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{}", HEADER).context("failed to write header")?;
    for c in courses {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            escape_field(&c.name),
            escape_field(&c.teacher),
            c.day_of_week.as_str(),
            c.period_slot.as_str(),
            escape_field(&c.location),
            c.week
        )
        .context("failed to write course line")?;
    }
    out.flush().context("failed to flush course file")?;
    Ok(courses.len())
}

/// Load rows from an exchange file. Lines that do not parse (wrong column
/// count, unknown day/period label, week out of range) are skipped and
/// counted rather than failing the whole file.
pub fn read_courses(path: &Path) -> anyhow::Result<(Vec<CsvCourse>, usize)> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if idx == 0 || line.trim().is_empty() {
            // Header line, or blank padding.
            continue;
        }
        match parse_line(&line) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    Ok((rows, skipped))
}

fn parse_line(line: &str) -> Option<CsvCourse> {
    let parts = split_line(line);
    if parts.len() != 6 {
        return None;
    }
    let day = Weekday::parse(&parts[2])?;
    let period = PeriodSlot::parse(&parts[3])?;
    let week: u8 = parts[5].trim().parse().ok()?;
    if !(MIN_WEEK..=MAX_WEEK).contains(&week) {
        return None;
    }
    let name = parts[0].trim().to_string();
    let teacher = parts[1].trim().to_string();
    let location = parts[4].trim().to_string();
    if name.is_empty() || teacher.is_empty() || location.is_empty() {
        return None;
    }
    Some(CsvCourse {
        name,
        teacher,
        day,
        period,
        location,
        week,
    })
}

/// Quote fields containing commas or quotes; double embedded quotes.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one line on commas, honoring quoted fields.
fn split_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                result.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    result.push(current);
    result
}
