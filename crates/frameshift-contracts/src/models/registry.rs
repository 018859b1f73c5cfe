use std::fmt;

use indexmap::IndexMap;

/// What a remote model is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Image in, image out.
    Image,
    Text,
    /// Long-running image-to-video operations.
    Video,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Image => "image",
            Capability::Text => "text",
            Capability::Video => "video",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

// First entry per capability is the default.
fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, capability: Capability| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                capabilities: vec![capability],
            },
        );
    };

    insert("gemini-2.5-flash-image", Capability::Image);
    insert("gemini-2.5-flash-image-preview", Capability::Image);
    insert("gemini-3-pro-image-preview", Capability::Image);
    insert("gemini-2.5-flash", Capability::Text);
    insert("gemini-2.5-pro", Capability::Text);
    insert("gemini-2.0-flash", Capability::Text);
    insert("veo-3.1-fast-generate-preview", Capability::Video);
    insert("veo-3.1-generate-preview", Capability::Video);
    insert("veo-3.0-fast-generate-001", Capability::Video);
    insert("veo-2.0-generate-001", Capability::Video);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_capability() {
        let registry = ModelRegistry::default();
        for capability in [Capability::Image, Capability::Text, Capability::Video] {
            assert!(!registry.by_capability(capability).is_empty());
        }
        assert_eq!(
            registry
                .by_capability(Capability::Video)
                .first()
                .map(|model| model.name.as_str()),
            Some("veo-3.1-fast-generate-preview")
        );
    }

    #[test]
    fn lookup_accepts_resource_prefix() {
        let registry = ModelRegistry::default();
        let model = registry.get("models/gemini-2.5-flash");
        assert_eq!(model.map(|spec| spec.name.as_str()), Some("gemini-2.5-flash"));
        assert!(registry
            .ensure("gemini-2.5-flash", Capability::Video)
            .is_none());
    }
}
