mod catalog;
pub mod generator;
mod images;
mod parse;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::SuggestConfig;
use crate::protocol::SuggestionItem;
use crate::store::ActivityStore;

pub use catalog::StaticCatalog;
pub use generator::SuggestionGenerator;
pub use images::ImageLinks;

const GENERIC_HINT: &str = "Nothing is known about the user's past activities yet.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackReason {
    #[error("no generative backend configured")]
    Disabled,
    #[error("generative backend failed: {0}")]
    Backend(String),
    #[error("generative backend exceeded {0}ms")]
    Timeout(u64),
    #[error("unusable generated reply: {0}")]
    Parse(String),
    #[error("generative backend returned no suggestions")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Generated(Vec<SuggestionItem>),
    Fallback {
        reason: FallbackReason,
        items: Vec<SuggestionItem>,
    },
}

impl Resolution {
    pub fn items(&self) -> &[SuggestionItem] {
        match self {
            Resolution::Generated(items) => items,
            Resolution::Fallback { items, .. } => items,
        }
    }

    pub fn into_items(self) -> Vec<SuggestionItem> {
        match self {
            Resolution::Generated(items) => items,
            Resolution::Fallback { items, .. } => items,
        }
    }
}

pub struct SuggestionResolver {
    config: SuggestConfig,
    catalog: StaticCatalog,
    images: ImageLinks,
    store: Arc<dyn ActivityStore>,
    generator: Option<Arc<dyn SuggestionGenerator>>,
    generator_timeout: Duration,
}

impl SuggestionResolver {
    pub fn new(
        config: SuggestConfig,
        catalog: StaticCatalog,
        images: ImageLinks,
        store: Arc<dyn ActivityStore>,
        generator: Option<Arc<dyn SuggestionGenerator>>,
        generator_timeout: Duration,
    ) -> Result<Self> {
        config.validate(catalog.len())?;
        Ok(Self {
            config,
            catalog,
            images,
            store,
            generator,
            generator_timeout,
        })
    }

    /// Suggestions for `owner`, generated when possible. Never fails: any
    /// problem on the generative path lands in the static fallback.
    pub async fn resolve(&self, owner: Option<&str>) -> Resolution {
        let Some(generator) = self.generator.as_deref() else {
            return self.fallback(FallbackReason::Disabled);
        };

        match self.generate(generator, owner).await {
            Ok(items) => {
                debug!(
                    backend = generator.name(),
                    count = items.len(),
                    "serving generated suggestions"
                );
                Resolution::Generated(items)
            }
            Err(reason) => {
                warn!(
                    backend = generator.name(),
                    %reason,
                    "generated suggestions unavailable, serving static fallback"
                );
                self.fallback(reason)
            }
        }
    }

    async fn generate(
        &self,
        generator: &dyn SuggestionGenerator,
        owner: Option<&str>,
    ) -> Result<Vec<SuggestionItem>, FallbackReason> {
        let hint = self.history_hint(owner).await;
        let prompt = build_prompt(&hint, self.config.count);

        let raw = match timeout(self.generator_timeout, generator.generate(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(error)) => return Err(FallbackReason::Backend(format!("{error:#}"))),
            Err(_) => {
                return Err(FallbackReason::Timeout(
                    self.generator_timeout.as_millis() as u64,
                ))
            }
        };

        let entries = parse::parse_generated(&raw)
            .map_err(|error| FallbackReason::Parse(format!("{error:#}")))?;
        if entries.is_empty() {
            return Err(FallbackReason::Empty);
        }

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                // a blank keyword would leave the image path empty
                let keyword = if entry.keyword.trim().is_empty() {
                    &entry.title
                } else {
                    &entry.keyword
                };
                let image_url = self.images.generated(keyword);
                SuggestionItem {
                    id: self.config.generated_base + index as i64,
                    title: entry.title,
                    desc: entry.desc,
                    image_url,
                }
            })
            .collect())
    }

    async fn history_hint(&self, owner: Option<&str>) -> String {
        let Some(owner) = owner.map(str::trim).filter(|owner| !owner.is_empty()) else {
            return GENERIC_HINT.to_string();
        };

        match self
            .store
            .recent_by_owner(owner, self.config.history_limit)
            .await
        {
            Ok(records) if !records.is_empty() => {
                let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
                format!(
                    "The user recently saved these activities: {}.",
                    titles.join(", ")
                )
            }
            Ok(_) => GENERIC_HINT.to_string(),
            Err(error) => {
                warn!(owner, "failed to load activity history for prompt: {error}");
                GENERIC_HINT.to_string()
            }
        }
    }

    fn fallback(&self, reason: FallbackReason) -> Resolution {
        // a fixed seed reseeds per call so repeated requests match
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let items = self
            .catalog
            .sample(self.config.count, &mut rng)
            .into_iter()
            .enumerate()
            .map(|(index, entry)| SuggestionItem {
                id: self.config.static_base + index as i64,
                title: entry.title.to_string(),
                desc: entry.description.to_string(),
                image_url: self.images.placeholder(entry.image_keyword, index),
            })
            .collect();
        Resolution::Fallback { reason, items }
    }
}

fn build_prompt(hint: &str, count: usize) -> String {
    format!(
        "Suggest {count} short, concrete activities someone could do today. {hint}\n\
         Reply with only a JSON array of {count} objects with the keys \"title\" (at most six words), \
         \"desc\" (one sentence) and \"keyword\" (one or two English words for an image search).\n\
         Do not wrap the reply in markdown or code fences and do not add any other text."
    )
}
