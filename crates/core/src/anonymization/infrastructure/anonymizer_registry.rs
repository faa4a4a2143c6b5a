use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::shared::error::{BlanketError, BlanketResult};

use super::anonymizer_cache::AnonymizerCache;
use super::black_box_anonymizer::BlackBoxAnonymizer;
use super::conditioned_facefusion_anonymizer::ConditionedFacefusionAnonymizer;
use super::facefusion_anonymizer::FacefusionAnonymizer;
use super::gaussian_blur_anonymizer::GaussianBlurAnonymizer;
use super::pixelation_anonymizer::PixelationAnonymizer;
use super::stable_diffusion_anonymizer::StableDiffusionAnonymizer;

/// Builds a strategy from its settings. Composite strategies resolve their
/// parts through the cache they are being built for.
pub type AnonymizerConstructor = Box<
    dyn Fn(AnonymizerSettings, &AnonymizerCache) -> BlanketResult<Arc<dyn Anonymizer>>
        + Send
        + Sync,
>;

struct RegistryEntry {
    parameters_file: String,
    constructor: AnonymizerConstructor,
}

/// Maps each method to its parameters file and constructor.
pub struct AnonymizerRegistry {
    parameters_folder: PathBuf,
    entries: HashMap<AnonymizationMethod, RegistryEntry>,
}

impl AnonymizerRegistry {
    /// A registry with nothing registered.
    pub fn new(parameters_folder: impl Into<PathBuf>) -> Self {
        Self {
            parameters_folder: parameters_folder.into(),
            entries: HashMap::new(),
        }
    }

    /// A registry with every built-in strategy registered.
    pub fn with_defaults(parameters_folder: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(parameters_folder);
        registry.register(AnonymizationMethod::BlackBox, |settings, _| {
            Ok(Arc::new(BlackBoxAnonymizer::new(settings)?))
        });
        registry.register(AnonymizationMethod::GaussianBlur, |settings, _| {
            Ok(Arc::new(GaussianBlurAnonymizer::new(settings)?))
        });
        registry.register(AnonymizationMethod::Pixelation, |settings, _| {
            Ok(Arc::new(PixelationAnonymizer::new(settings)?))
        });
        registry.register(AnonymizationMethod::StableDiffusion, |settings, _| {
            Ok(Arc::new(StableDiffusionAnonymizer::new(settings)?))
        });
        registry.register(AnonymizationMethod::Facefusion, |settings, _| {
            Ok(Arc::new(FacefusionAnonymizer::new(settings)?))
        });
        registry.register(
            AnonymizationMethod::StableDiffusionConditionedFacefusion,
            build_conditioned_facefusion,
        );
        registry
    }

    /// Registers (or replaces) the constructor for `method`, reading its
    /// settings from the method's default parameters file.
    pub fn register(
        &mut self,
        method: AnonymizationMethod,
        constructor: impl Fn(AnonymizerSettings, &AnonymizerCache) -> BlanketResult<Arc<dyn Anonymizer>>
            + Send
            + Sync
            + 'static,
    ) {
        self.entries.insert(
            method,
            RegistryEntry {
                parameters_file: method.parameters_file_name(),
                constructor: Box::new(constructor),
            },
        );
    }

    pub fn parameters_folder(&self) -> &Path {
        &self.parameters_folder
    }

    pub fn is_registered(&self, method: AnonymizationMethod) -> bool {
        self.entries.contains_key(&method)
    }

    /// Registered methods in declaration order.
    pub fn methods(&self) -> Vec<AnonymizationMethod> {
        AnonymizationMethod::ALL
            .into_iter()
            .filter(|m| self.entries.contains_key(m))
            .collect()
    }

    pub fn parameters_path(&self, method: AnonymizationMethod) -> BlanketResult<PathBuf> {
        Ok(self.parameters_folder.join(&self.entry(method)?.parameters_file))
    }

    pub fn load_settings(&self, method: AnonymizationMethod) -> BlanketResult<AnonymizerSettings> {
        AnonymizerSettings::load(&self.parameters_path(method)?)
    }

    /// Loads the method's settings and runs its constructor.
    pub fn create(
        &self,
        method: AnonymizationMethod,
        cache: &AnonymizerCache,
    ) -> BlanketResult<Arc<dyn Anonymizer>> {
        let entry = self.entry(method)?;
        let settings = self.load_settings(method)?;
        log::info!("Creating {method} anonymizer");
        (entry.constructor)(settings, cache)
    }

    fn entry(&self, method: AnonymizationMethod) -> BlanketResult<&RegistryEntry> {
        self.entries.get(&method).ok_or_else(|| {
            let available: Vec<&str> = self.methods().iter().map(|m| m.as_str()).collect();
            BlanketError::Configuration(format!(
                "no anonymizer registered for {method}; available: {}",
                available.join(", ")
            ))
        })
    }
}

/// Inpainting comes from the cache; the synthesizer reads the inline
/// `facefusion` object when present, else the facefusion parameters file.
fn build_conditioned_facefusion(
    settings: AnonymizerSettings,
    cache: &AnonymizerCache,
) -> BlanketResult<Arc<dyn Anonymizer>> {
    let inpainter = cache.get(AnonymizationMethod::StableDiffusion)?;
    let facefusion_settings = match settings.extra::<AnonymizerSettings>("facefusion")? {
        Some(inline) => inline,
        None => cache.registry().load_settings(AnonymizationMethod::Facefusion)?,
    };
    let synthesizer = Arc::new(FacefusionAnonymizer::new(facefusion_settings)?);
    Ok(Arc::new(ConditionedFacefusionAnonymizer::new(
        settings,
        inpainter,
        synthesizer,
    )?))
}
