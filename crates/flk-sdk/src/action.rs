use crate::{Feature, Result};

/// Action trait - one stage of a feature pipeline
/// Returns the feature to hand to the next stage (may be modified)
pub trait Action {
    fn name(&self) -> &str;

    fn execute(&mut self, feature: Feature) -> Result<Feature>;

    /// Release any resources held by the action at the end of a run
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
