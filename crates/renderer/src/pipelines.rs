//! Pipeline registry.
//!
//! Pipelines are built against one pass's render pass and extent, so they
//! go stale whenever that pass is recreated. The registry keeps each
//! pipeline's description next to the built object and rebuilds the ones
//! belonging to recreated passes. Handles ([`PipelineId`]) stay valid
//! across rebuilds.

use std::sync::Arc;

use tracing::{debug, info};

use deferred_rhi::device::Device;
use deferred_rhi::pipeline::{GraphicsPipelineDesc, Pipeline};
use deferred_rhi::{RhiError, RhiResult};

use crate::passes::{PassKind, RenderGraph};

/// Stable handle to a registered pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(usize);

struct Entry {
    pass: PassKind,
    desc: GraphicsPipelineDesc,
    pipeline: Pipeline,
}

/// Every graphics pipeline of the frame, grouped by pass.
pub struct PipelineRegistry {
    device: Arc<Device>,
    entries: Vec<Entry>,
}

impl PipelineRegistry {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            entries: Vec::new(),
        }
    }

    /// Builds `desc` for `pass` and keeps it for later rebuilds.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass has no render pass or the pipeline
    /// cannot be built.
    pub fn register(
        &mut self,
        pass: PassKind,
        desc: GraphicsPipelineDesc,
        graph: &RenderGraph,
    ) -> RhiResult<PipelineId> {
        let pipeline = build_for(&self.device, &desc, pass, graph)?;
        debug!("Registered pipeline '{}' for {} pass", desc.name(), pass);
        self.entries.push(Entry {
            pass,
            desc,
            pipeline,
        });
        Ok(PipelineId(self.entries.len() - 1))
    }

    /// The pipeline behind `id`.
    pub fn get(&self, id: PipelineId) -> RhiResult<&Pipeline> {
        self.entries
            .get(id.0)
            .map(|entry| &entry.pipeline)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("no pipeline registered as {:?}", id))
            })
    }

    /// Rebuilds every pipeline bound to one of `passes`.
    ///
    /// Returns the number rebuilt. The GPU must be idle.
    pub fn rebuild(&mut self, graph: &RenderGraph, passes: &[PassKind]) -> RhiResult<usize> {
        let bound: Vec<_> = self.entries.iter().map(|entry| entry.pass).collect();
        let stale = stale_entries(&bound, passes);
        for &index in &stale {
            let entry = &mut self.entries[index];
            entry.pipeline = build_for(&self.device, &entry.desc, entry.pass, graph)?;
        }
        info!("Rebuilt {} pipeline(s)", stale.len());
        Ok(stale.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Indices of the entries, bound to the passes in `bound`, that a rebuild of
/// `recreated` invalidates.
fn stale_entries(bound: &[PassKind], recreated: &[PassKind]) -> Vec<usize> {
    bound
        .iter()
        .enumerate()
        .filter(|&(_, pass)| recreated.contains(pass))
        .map(|(index, _)| index)
        .collect()
}

fn build_for(
    device: &Arc<Device>,
    desc: &GraphicsPipelineDesc,
    pass: PassKind,
    graph: &RenderGraph,
) -> RhiResult<Pipeline> {
    let graph_pass = graph.pass(pass);
    desc.build(device.clone(), graph_pass.render_pass()?, graph_pass.extent())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: [PassKind; 5] = [
        PassKind::Depth,
        PassKind::Geometry,
        PassKind::Lighting,
        PassKind::Final,
        PassKind::Final,
    ];

    #[test]
    fn test_resize_rebuilds_all_but_depth_pipelines() {
        assert_eq!(stale_entries(&DEMO, &PassKind::SWAPCHAIN_SIZED), [1, 2, 3, 4]);
    }

    #[test]
    fn test_rebuild_is_limited_to_listed_passes() {
        assert_eq!(stale_entries(&DEMO, &[PassKind::Final]), [3, 4]);
        assert_eq!(stale_entries(&DEMO, &[PassKind::Depth]), [0]);
        assert!(stale_entries(&DEMO, &[]).is_empty());
        assert!(stale_entries(&[], &PassKind::ALL).is_empty());
    }
}
