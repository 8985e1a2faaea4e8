use pano_config::PipelineConfig;

/// Configuration store the coordinator reads variant names from.
///
/// Read once per submission, so a settings change applies to the next job.
pub trait VariantSettings {
    fn stitch_variant(&self) -> String;
    fn completion_variant(&self) -> String;

    fn blend_enabled(&self) -> bool {
        true
    }
}

impl VariantSettings for PipelineConfig {
    fn stitch_variant(&self) -> String {
        self.stitch_algo.clone()
    }

    fn completion_variant(&self) -> String {
        self.complete_algo.clone()
    }

    fn blend_enabled(&self) -> bool {
        self.blend_enabled
    }
}
