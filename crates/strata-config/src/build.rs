//! Instantiating a patch into a live graph.

use strata_core::{AudioObjectInstance, AudioProcessor, NodeManager};

use crate::objects::ObjectDesc;
use crate::patch::Patch;
use crate::validation::validate_patch;
use crate::ConfigError;

/// A patch instantiated into a node manager.
///
/// Owns every object instance; dropping it releases all of the patch's
/// nodes, which the audio side then stops rendering.
pub struct PatchInstance {
    manager: NodeManager,
    objects: Vec<Box<dyn AudioObjectInstance>>,
}

impl std::fmt::Debug for PatchInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchInstance")
            .field("objects", &self.ids().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PatchInstance {
    /// The manager the patch lives in.
    pub fn manager(&self) -> &NodeManager {
        &self.manager
    }

    /// Look up an instantiated object by id.
    pub fn object(&self, id: &str) -> Option<&dyn AudioObjectInstance> {
        self.objects
            .iter()
            .find(|o| o.name() == id)
            .map(|o| &**o)
    }

    /// Object ids in instantiation order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.name())
    }

    /// Number of instantiated objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the patch has no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Patch {
    /// Validate the patch, create a node manager from its `[engine]` table
    /// and instantiate every object and output route.
    pub fn build(&self) -> Result<(PatchInstance, AudioProcessor), ConfigError> {
        let (manager, processor) = NodeManager::new(self.engine.to_engine_config());
        let instance = self.instantiate(manager)?;
        Ok((instance, processor))
    }

    /// Instantiate the patch into an existing manager.
    ///
    /// Objects are built in declaration order. On error, everything built so
    /// far is dropped and its nodes released.
    pub fn instantiate(&self, manager: NodeManager) -> Result<PatchInstance, ConfigError> {
        validate_patch(self)?;
        let mut objects: Vec<Box<dyn AudioObjectInstance>> = Vec::with_capacity(self.objects.len());

        for config in &self.objects {
            let object = ObjectDesc::parse(self, config)?.into_object()?;
            let instance = {
                let inputs: Vec<&dyn AudioObjectInstance> = config
                    .inputs
                    .iter()
                    .filter_map(|id| objects.iter().find(|o| o.name() == id))
                    .map(|o| &**o)
                    .collect();
                object
                    .instantiate(&config.id, &manager, &inputs)
                    .map_err(|source| ConfigError::object(&config.id, source))?
            };
            tracing::debug!(
                id = %config.id,
                object_type = %config.object_type,
                channels = instance.channel_count(),
                "patch object built"
            );
            objects.push(instance);
        }

        let host_channels = manager.output_channels();
        for output in &self.outputs {
            let Some(object) = objects.iter().find(|o| o.name() == output.object) else {
                continue;
            };
            for (object_channel, host_channel) in
                output.pairs(object.channel_count(), host_channels)
            {
                let Some(source) = object.output_for_channel(object_channel) else {
                    tracing::warn!(
                        object = %output.object,
                        channel = object_channel,
                        "output route names a missing object channel"
                    );
                    continue;
                };
                manager
                    .route(host_channel, source)
                    .map_err(|source| ConfigError::Route {
                        id: output.object.clone(),
                        source,
                    })?;
            }
        }

        tracing::info!(
            name = %self.name,
            objects = objects.len(),
            nodes = manager.live_node_count(),
            "patch instantiated"
        );
        Ok(PatchInstance { manager, objects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{ObjectConfig, OutputConfig};
    use crate::validation::ValidationError;

    fn dc_patch() -> Patch {
        let mut patch = Patch::new("dc")
            .with_object(
                ObjectConfig::new("dc", "constant")
                    .with_channels(2)
                    .with_param("value", vec![0.5, -0.25]),
            )
            .with_object(
                ObjectConfig::new("amp", "gain")
                    .with_channels(2)
                    .with_input("dc")
                    .with_param("gain", 2.0f32),
            )
            .with_output(OutputConfig::new("amp"));
        patch.engine.sample_rate = 1000;
        patch.engine.block_size = 4;
        patch
    }

    #[test]
    fn test_build_and_render() {
        let (instance, mut processor) = dc_patch().build().unwrap();
        assert_eq!(instance.len(), 2);
        assert_eq!(instance.ids().collect::<Vec<_>>(), vec!["dc", "amp"]);
        assert_eq!(instance.object("amp").unwrap().channel_count(), 2);
        assert_eq!(instance.manager().live_node_count(), 4);

        let mut out = vec![0.0f32; 8];
        processor.process(&mut out);
        assert_eq!(out, vec![1.0, -0.5, 1.0, -0.5, 1.0, -0.5, 1.0, -0.5]);
    }

    #[test]
    fn test_swapped_output_channels() {
        let mut patch = dc_patch();
        patch.outputs[0].channels = Some(vec![1, 0]);
        let (_instance, mut processor) = patch.build().unwrap();
        let mut out = vec![0.0f32; 2];
        processor.process(&mut out);
        assert_eq!(out, vec![-0.5, 1.0]);
    }

    #[test]
    fn test_invalid_patch_builds_nothing() {
        let patch = dc_patch().with_object(ObjectConfig::new("bad", "reverb"));
        assert!(matches!(
            patch.build(),
            Err(ConfigError::Validation(ValidationError::UnknownObjectType { .. }))
        ));
    }

    #[test]
    fn test_dropping_instance_releases_nodes() {
        let patch = dc_patch();
        let (manager, mut processor) = NodeManager::new(patch.engine.to_engine_config());
        let instance = patch.instantiate(manager).unwrap();
        let manager = instance.manager().clone();
        assert_eq!(manager.live_node_count(), 4);

        drop(instance);
        let mut out = vec![0.0f32; 8];
        processor.process(&mut out);
        manager.collect_garbage();
        assert_eq!(manager.live_node_count(), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
