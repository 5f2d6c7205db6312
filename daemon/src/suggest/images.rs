use anyhow::{anyhow, Context, Result};
use reqwest::Url;

use crate::config::ImageConfig;

#[derive(Debug, Clone)]
pub struct ImageLinks {
    generated: Url,
    placeholder: Url,
}

impl ImageLinks {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        Ok(Self {
            generated: parse_base(&config.generated_endpoint)
                .context("invalid images.generated_endpoint")?,
            placeholder: parse_base(&config.placeholder_endpoint)
                .context("invalid images.placeholder_endpoint")?,
        })
    }

    pub fn generated(&self, keyword: &str) -> String {
        let mut url = self.generated.clone();
        push_segment(&mut url, keyword.trim());
        url.query_pairs_mut()
            .append_pair("width", "640")
            .append_pair("height", "480")
            .append_pair("nologo", "true");
        url.into()
    }

    pub fn placeholder(&self, keyword: &str, lock: usize) -> String {
        let mut url = self.placeholder.clone();
        push_segment(&mut url, keyword.trim());
        url.query_pairs_mut().append_pair("lock", &lock.to_string());
        url.into()
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim().trim_end_matches('/'))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("{raw} cannot carry path segments"));
    }
    Ok(url)
}

fn push_segment(url: &mut Url, segment: &str) {
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(segment);
    }
}
