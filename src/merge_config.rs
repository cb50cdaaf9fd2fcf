use std::path::PathBuf;

/// Configuration options for a merge run.
///
/// Use [`MergeConfig::builder()`] to create a configuration instance.
/// This allows you to customize only the desired fields while falling back to sensible defaults for the rest.
///
/// # Configuration Options
///
/// | Parameter | Type | Default | Description |
/// |-----------|------|---------|-------------|
/// | `include_notes` | `bool` | `true` | Whether speaker notes are carried over with their slides |
/// | `template` | `Option<PathBuf>` | `None` | Package whose presentation settings (slide size, properties) the output uses; its slides are not copied |
/// | `parallel` | `bool` | `true` | Whether theme chain parts are prepared on the rayon thread pool |
/// | `pdf_renderer` | `PathBuf` | `pdftoppm` | Poppler program that rasterises PDF inputs, looked up on `PATH` |
/// | `pdf_resolution` | `u32` | `200` | Dots per inch PDF pages are rendered at |
///
/// # Example
///
/// ```
/// use pptx_combine::MergeConfig;
///
/// let config = MergeConfig::builder()
///     .include_notes(false)
///     .build();
/// assert!(config.template.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub include_notes: bool,
    pub template: Option<PathBuf>,
    pub parallel: bool,
    pub pdf_renderer: PathBuf,
    pub pdf_resolution: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            include_notes: true,
            template: None,
            parallel: true,
            pdf_renderer: PathBuf::from("pdftoppm"),
            pdf_resolution: 200,
        }
    }
}

impl MergeConfig {
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder::default()
    }
}

/// Builder for [`MergeConfig`].
///
/// Allows setting individual configuration fields while falling back to defaults for any unspecified values
#[derive(Debug, Default)]
pub struct MergeConfigBuilder {
    include_notes: Option<bool>,
    template: Option<PathBuf>,
    parallel: Option<bool>,
    pdf_renderer: Option<PathBuf>,
    pdf_resolution: Option<u32>,
}

impl MergeConfigBuilder {
    /// Sets whether notes slides are copied along with their slides.
    pub fn include_notes(mut self, value: bool) -> Self {
        self.include_notes = Some(value);
        self
    }

    /// Takes the output's presentation settings from this package instead of the first readable input.
    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(path.into());
        self
    }

    pub fn parallel(mut self, value: bool) -> Self {
        self.parallel = Some(value);
        self
    }

    /// Program used to turn PDF pages into PNG images.
    pub fn pdf_renderer(mut self, program: impl Into<PathBuf>) -> Self {
        self.pdf_renderer = Some(program.into());
        self
    }

    pub fn pdf_resolution(mut self, dpi: u32) -> Self {
        self.pdf_resolution = Some(dpi);
        self
    }

    /// Builds the final [`MergeConfig`] instance, applying default values for any fields that were not set.
    pub fn build(self) -> MergeConfig {
        let defaults = MergeConfig::default();
        MergeConfig {
            include_notes: self.include_notes.unwrap_or(defaults.include_notes),
            template: self.template,
            parallel: self.parallel.unwrap_or(defaults.parallel),
            pdf_renderer: self.pdf_renderer.unwrap_or(defaults.pdf_renderer),
            pdf_resolution: self.pdf_resolution.unwrap_or(defaults.pdf_resolution).max(1),
        }
    }
}
