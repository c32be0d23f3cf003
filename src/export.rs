//! Hand-off to the price annotation step: a plain list of captured image
//! urls, and the question page that shows them to annotators.

use std::fmt::Write as _;
use std::path::Path;

use tracing::info;

use crate::error::ExportError;
use crate::model::{Collection, Outcome};
use crate::store::read_collection;

const LINKS_MARKER: &str = "===LINKS===";
const ANSWERS_MARKER: &str = "===ANSWERS===";
const COUNT_MARKER: &str = "===NUMLINKS===";

/// Image urls of captured candidates, in store order.
pub fn captured_image_links(collection: &Collection) -> Vec<&str> {
    collection
        .iter()
        .flat_map(|seed| seed.candidates())
        .filter(|candidate| candidate.outcome() == Outcome::Captured)
        .filter_map(|candidate| candidate.extracted_image_url.as_deref())
        .filter(|url| !url.is_empty())
        .collect()
}

/// One url per line. Returns the number of lines written.
pub fn write_link_list(path: &Path, links: &[&str]) -> Result<usize, ExportError> {
    let mut data = String::new();
    for link in links {
        data.push_str(link);
        data.push('\n');
    }
    std::fs::write(path, data).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), links = links.len(), "link list written");
    Ok(links.len())
}

/// Read `store` and write its captured image urls to `output`.
pub fn export_links(store: &Path, output: &Path) -> Result<usize, ExportError> {
    let collection = read_collection(store)?;
    write_link_list(output, &captured_image_links(&collection))
}

pub fn read_link_list(path: &Path) -> Result<Vec<String>, ExportError> {
    let data = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Fill the question template: one image with a price field per link, one
/// answer binding per link, and the link count. Fields are numbered from 1.
pub fn render_question(template: &str, links: &[String]) -> String {
    let mut blocks = String::new();
    let mut answers = String::new();
    for (i, link) in links.iter().enumerate() {
        let n = i + 1;
        if n > 1 {
            blocks.push('\n');
            answers.push('\n');
        }
        let _ = write!(
            blocks,
            "<div>\n    <img src=\"{link}\" style=\"height: 300px;\"/><br/><input type=\"text\" id=\"price{n}\" style=\"width: 600px;\">\n    </div>"
        );
        let _ = write!(answers, "answer.link{n} = $(\"#price{n}\").val();");
    }
    template
        .replace(LINKS_MARKER, &blocks)
        .replace(ANSWERS_MARKER, &answers)
        .replace(COUNT_MARKER, &links.len().to_string())
}
