//! Page selection expressions

use crate::error::{Error, Result};

/// Parse a page selection like `"3, 1-2, 7-5"` into 1-based page numbers
///
/// Order is preserved and repeats are kept, so `"2,1,1"` selects page 2, then
/// page 1 twice. A descending range counts down. Blank input selects nothing.
pub fn parse_page_selection(input: &str) -> Result<Vec<u32>> {
    let mut pages = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_page(start)?;
            let end = parse_page(end)?;
            if start <= end {
                pages.extend(start..=end);
            } else {
                pages.extend((end..=start).rev());
            }
        } else {
            pages.push(parse_page(part)?);
        }
    }

    Ok(pages)
}

fn parse_page(text: &str) -> Result<u32> {
    let text = text.trim();
    match text.parse::<u32>() {
        Ok(0) => Err(Error::InvalidRange("pages are numbered from 1".to_string())),
        Ok(page) => Ok(page),
        Err(_) => Err(Error::InvalidRange(format!("Invalid page: {}", text))),
    }
}
