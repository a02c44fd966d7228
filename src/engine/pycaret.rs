//! PyCaret adapter. The engine is disabled and reports every run as skipped.

use crate::error::EngineError;

use super::{EngineAdapter, EngineKind, EngineResult, TrainingContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct PyCaretEngine;

impl EngineAdapter for PyCaretEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PyCaret
    }

    fn run(&self, _ctx: &TrainingContext<'_>) -> Result<EngineResult, EngineError> {
        Ok(EngineResult::skipped(
            "PyCaret is disabled in this build; choose flaml, tpot, h2o or autogluon",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_pycaret_always_skips() {
        let split = fixtures::blobs(200, 1);
        let cancel = AtomicBool::new(false);
        let result = PyCaretEngine.run(&fixtures::context(&split, &cancel)).unwrap();
        assert!(result.skipped);
        assert!(result.reason.unwrap().contains("disabled"));
    }
}
