use indexmap::IndexMap;

pub const DEFAULT_IMAGE_MODEL: &str = "jimeng-4.0";
pub const DEFAULT_VIDEO_MODEL: &str = "jimeng-video-3.0";
pub const DEFAULT_BLEND_MODEL: &str = "jimeng-3.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Image,
    Video,
}

/// Public model alias and the internal key the generate endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub request_key: String,
    pub kind: ModelKind,
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
        self.models.get(name)
    }

    /// Internal request key for an alias, falling back to the default image
    /// model for anything unrecognized.
    pub fn request_key(&self, name: &str) -> &str {
        self.models
            .get(name)
            .or_else(|| self.models.get(DEFAULT_IMAGE_MODEL))
            .map(|model| model.request_key.as_str())
            .unwrap_or_default()
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_kind(&self, kind: ModelKind) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.kind == kind)
            .cloned()
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, request_key: &str, kind: ModelKind| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                request_key: request_key.to_string(),
                kind,
            },
        );
    };

    insert("jimeng-4.0", "high_aes_general_v40", ModelKind::Image);
    insert(
        "jimeng-3.1",
        "high_aes_general_v30l_art_fangzhou:general_v3.0_18b",
        ModelKind::Image,
    );
    insert(
        "jimeng-3.0",
        "high_aes_general_v30l:general_v3.0_18b",
        ModelKind::Image,
    );
    insert(
        "jimeng-2.1",
        "high_aes_general_v21_L:general_v2.1_L",
        ModelKind::Image,
    );
    insert(
        "jimeng-2.0-pro",
        "high_aes_general_v20_L:general_v2.0_L",
        ModelKind::Image,
    );
    insert(
        "jimeng-2.0",
        "high_aes_general_v20:general_v2.0",
        ModelKind::Image,
    );
    insert(
        "jimeng-1.4",
        "high_aes_general_v14:general_v1.4",
        ModelKind::Image,
    );
    insert("jimeng-xl-pro", "text2img_xl_sft", ModelKind::Image);
    insert(
        "jimeng-video-3.0-pro",
        "dreamina_ic_generate_video_model_vgfm_3.0_pro",
        ModelKind::Video,
    );
    insert(
        "jimeng-video-3.0",
        "dreamina_ic_generate_video_model_vgfm_3.0",
        ModelKind::Video,
    );
    insert(
        "jimeng-video-2.0",
        "dreamina_ic_generate_video_model_vgfm_lite",
        ModelKind::Video,
    );
    insert(
        "jimeng-video-2.0-pro",
        "dreamina_ic_generate_video_model_vgfm1.0",
        ModelKind::Video,
    );
    insert(
        "jimeng-video-multiframe",
        "dreamina_ic_generate_video_model_vgfm_3.0",
        ModelKind::Video,
    );

    map
}
