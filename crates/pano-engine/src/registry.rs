//! Variant-name to backend resolution.

use crate::backends::{
    ClassicalInpainter, InpaintModelRuntime, LearnedInpainter, OverlapStitcher, PassThroughCompleter,
};
use crate::capability::{CompletionCapability, StitchingCapability};
use crate::error::{ResolutionError, StageKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Stitching algorithm selectable through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StitcherVariant {
    /// As-projective-as-possible warping, supplied by a native engine.
    ProjectiveMultiHomography,
    FeatureBasedBasic,
}

/// Completion algorithm selectable through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompleterVariant {
    LearnedInpainting,
    ClassicalInpainting,
    PassThrough,
}

impl StitcherVariant {
    pub const ALL: [StitcherVariant; 2] = [Self::ProjectiveMultiHomography, Self::FeatureBasedBasic];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectiveMultiHomography => "projective-multi-homography",
            Self::FeatureBasedBasic => "feature-based-basic",
        }
    }
}

impl CompleterVariant {
    pub const ALL: [CompleterVariant; 3] = [
        Self::LearnedInpainting,
        Self::ClassicalInpainting,
        Self::PassThrough,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LearnedInpainting => "learned-inpainting",
            Self::ClassicalInpainting => "classical-inpainting",
            Self::PassThrough => "pass-through",
        }
    }
}

impl FromStr for StitcherVariant {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apap" | "projective-multi-homography" => Ok(Self::ProjectiveMultiHomography),
            "sift" | "feature-based-basic" => Ok(Self::FeatureBasedBasic),
            _ => Err(ResolutionError::UnknownVariant {
                stage: StageKind::Stitch,
                name: s.to_string(),
            }),
        }
    }
}

impl FromStr for CompleterVariant {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lama" | "learned-inpainting" => Ok(Self::LearnedInpainting),
            "opencv" | "classical-inpainting" => Ok(Self::ClassicalInpainting),
            "none" | "pass-through" => Ok(Self::PassThrough),
            _ => Err(ResolutionError::UnknownVariant {
                stage: StageKind::Completion,
                name: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for StitcherVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for CompleterVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-supplied resources the registry builds backends from.
///
/// Passed explicitly instead of living in process-wide state. Native
/// engines are optional; variants that need a missing one resolve to
/// [`ResolutionError::Unavailable`].
#[derive(Default, Clone)]
pub struct EngineContext {
    pub model_path: Option<PathBuf>,
    pub projective_stitcher: Option<Arc<dyn StitchingCapability>>,
    pub inpaint_runtime: Option<Arc<dyn InpaintModelRuntime>>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_projective_stitcher(mut self, stitcher: Arc<dyn StitchingCapability>) -> Self {
        self.projective_stitcher = Some(stitcher);
        self
    }

    pub fn with_inpaint_runtime(mut self, runtime: Arc<dyn InpaintModelRuntime>) -> Self {
        self.inpaint_runtime = Some(runtime);
        self
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("model_path", &self.model_path)
            .field("projective_stitcher", &self.projective_stitcher.as_ref().map(|s| s.name()))
            .field("inpaint_runtime", &self.inpaint_runtime.is_some())
            .finish()
    }
}

/// Maps variants to capability objects.
///
/// Resolution validates backing assets up front, so a job is never
/// accepted with a backend that would fail on first use for a missing file.
pub struct AlgorithmRegistry {
    stitchers: HashMap<StitcherVariant, Arc<dyn StitchingCapability>>,
    completers: HashMap<CompleterVariant, Arc<dyn CompletionCapability>>,
}

impl AlgorithmRegistry {
    /// Registry with the built-in backends plus whatever `ctx` provides.
    pub fn new(ctx: EngineContext) -> Self {
        let mut registry = Self::empty();
        registry.register_stitcher(
            StitcherVariant::FeatureBasedBasic,
            Arc::new(OverlapStitcher::default()),
        );
        registry.register_completer(
            CompleterVariant::ClassicalInpainting,
            Arc::new(ClassicalInpainter::default()),
        );
        registry.register_completer(CompleterVariant::PassThrough, Arc::new(PassThroughCompleter));

        if let Some(stitcher) = ctx.projective_stitcher {
            registry.register_stitcher(StitcherVariant::ProjectiveMultiHomography, stitcher);
        }
        if let Some(runtime) = ctx.inpaint_runtime {
            registry.register_completer(
                CompleterVariant::LearnedInpainting,
                Arc::new(LearnedInpainter::new(runtime, ctx.model_path)),
            );
        }
        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            stitchers: HashMap::new(),
            completers: HashMap::new(),
        }
    }

    /// Install or replace the backend for a stitch variant.
    pub fn register_stitcher(&mut self, variant: StitcherVariant, backend: Arc<dyn StitchingCapability>) {
        debug!(%variant, backend = backend.name(), "Stitcher registered");
        self.stitchers.insert(variant, backend);
    }

    /// Install or replace the backend for a completion variant.
    pub fn register_completer(&mut self, variant: CompleterVariant, backend: Arc<dyn CompletionCapability>) {
        debug!(%variant, backend = backend.name(), "Completer registered");
        self.completers.insert(variant, backend);
    }

    pub fn resolve_stitcher(&self, variant: StitcherVariant) -> Result<Arc<dyn StitchingCapability>, ResolutionError> {
        let backend = self
            .stitchers
            .get(&variant)
            .ok_or(ResolutionError::Unavailable {
                variant: variant.as_str(),
            })?;
        backend.validate()?;
        Ok(Arc::clone(backend))
    }

    pub fn resolve_completer(
        &self,
        variant: CompleterVariant,
    ) -> Result<Arc<dyn CompletionCapability>, ResolutionError> {
        let backend = self
            .completers
            .get(&variant)
            .ok_or(ResolutionError::Unavailable {
                variant: variant.as_str(),
            })?;
        backend.validate()?;
        Ok(Arc::clone(backend))
    }

    /// Resolve a configured stitch variant name.
    pub fn resolve_stitcher_named(&self, name: &str) -> Result<Arc<dyn StitchingCapability>, ResolutionError> {
        self.resolve_stitcher(name.parse()?)
    }

    /// Resolve a configured completion variant name.
    pub fn resolve_completer_named(&self, name: &str) -> Result<Arc<dyn CompletionCapability>, ResolutionError> {
        self.resolve_completer(name.parse()?)
    }

    pub fn available_stitchers(&self) -> Vec<StitcherVariant> {
        StitcherVariant::ALL
            .into_iter()
            .filter(|v| self.stitchers.contains_key(v))
            .collect()
    }

    pub fn available_completers(&self) -> Vec<CompleterVariant> {
        CompleterVariant::ALL
            .into_iter()
            .filter(|v| self.completers.contains_key(v))
            .collect()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new(EngineContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CompletionSession;
    use crate::error::BackendError;
    use image::RgbaImage;
    use std::path::Path;

    struct NullRuntime;

    impl InpaintModelRuntime for NullRuntime {
        fn load(&self, _model_path: &Path) -> Result<Box<dyn CompletionSession>, BackendError> {
            Err(BackendError::new("not loadable"))
        }
    }

    struct NullStitcher;

    impl StitchingCapability for NullStitcher {
        fn name(&self) -> &'static str {
            "null"
        }

        fn stitch(&self, _frames: &[RgbaImage], _blend: bool) -> Result<RgbaImage, BackendError> {
            Err(BackendError::new("null"))
        }
    }

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("APAP".parse::<StitcherVariant>(), Ok(StitcherVariant::ProjectiveMultiHomography));
        assert_eq!("sift".parse::<StitcherVariant>(), Ok(StitcherVariant::FeatureBasedBasic));
        assert_eq!("Feature-Based-Basic".parse::<StitcherVariant>(), Ok(StitcherVariant::FeatureBasedBasic));
        assert_eq!("LaMa".parse::<CompleterVariant>(), Ok(CompleterVariant::LearnedInpainting));
        assert_eq!("OPENCV".parse::<CompleterVariant>(), Ok(CompleterVariant::ClassicalInpainting));
        assert_eq!(" none ".parse::<CompleterVariant>(), Ok(CompleterVariant::PassThrough));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for v in StitcherVariant::ALL {
            assert_eq!(v.to_string().parse::<StitcherVariant>(), Ok(v));
        }
        for v in CompleterVariant::ALL {
            assert_eq!(v.to_string().parse::<CompleterVariant>(), Ok(v));
        }
    }

    #[test]
    fn unknown_names_are_resolution_errors() {
        let registry = AlgorithmRegistry::default();
        let err = registry.resolve_stitcher_named("BRISK").err().unwrap();
        assert_eq!(
            err,
            ResolutionError::UnknownVariant {
                stage: StageKind::Stitch,
                name: "BRISK".into()
            }
        );
        assert!(matches!(
            registry.resolve_completer_named("magic"),
            Err(ResolutionError::UnknownVariant { stage: StageKind::Completion, .. })
        ));
    }

    #[test]
    fn builtins_resolve_without_context() {
        let registry = AlgorithmRegistry::default();
        assert_eq!(
            registry.resolve_stitcher(StitcherVariant::FeatureBasedBasic).unwrap().name(),
            "feature-based-basic"
        );
        assert_eq!(
            registry.resolve_completer(CompleterVariant::PassThrough).unwrap().name(),
            "pass-through"
        );
        assert_eq!(
            registry.resolve_completer_named("OPENCV").unwrap().name(),
            "classical-inpainting"
        );
    }

    #[test]
    fn native_variants_need_a_provider() {
        let registry = AlgorithmRegistry::default();
        assert!(matches!(
            registry.resolve_stitcher_named("APAP"),
            Err(ResolutionError::Unavailable { .. })
        ));
        assert!(matches!(
            registry.resolve_completer_named("LAMA"),
            Err(ResolutionError::Unavailable { .. })
        ));

        let ctx = EngineContext::new().with_projective_stitcher(Arc::new(NullStitcher));
        let registry = AlgorithmRegistry::new(ctx);
        assert_eq!(registry.resolve_stitcher_named("APAP").unwrap().name(), "null");
        assert_eq!(registry.available_stitchers(), StitcherVariant::ALL.to_vec());
    }

    #[test]
    fn learned_inpainting_checks_model_file() {
        let ctx = EngineContext::new().with_inpaint_runtime(Arc::new(NullRuntime));
        let registry = AlgorithmRegistry::new(ctx);
        assert!(matches!(
            registry.resolve_completer(CompleterVariant::LearnedInpainting),
            Err(ResolutionError::AssetNotConfigured { .. })
        ));

        let ctx = EngineContext::new()
            .with_inpaint_runtime(Arc::new(NullRuntime))
            .with_model_path("/nonexistent/lama.pt");
        let registry = AlgorithmRegistry::new(ctx);
        assert!(matches!(
            registry.resolve_completer(CompleterVariant::LearnedInpainting),
            Err(ResolutionError::MissingAsset { .. })
        ));
    }
}
