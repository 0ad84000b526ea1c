//! Shader sources, variants and cached shader modules
//!
//! A shader module is identified by its stage, its source bytes, its entry
//! point and its variant. Two identical sources compiled with different
//! variants are distinct modules.

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::{Backend, CompiledShaderModule};
use crate::error::{ResourceError, ResourceResult};
use crate::resources::ResourceId;

/// Raw shader source bytes
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    data: Vec<u8>,
}

impl ShaderSource {
    /// Wrap source bytes
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// The source bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for ShaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderSource")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Preprocessor configuration applied to a shader source
///
/// The preamble is text prepended to the source; processes are the ordered
/// preprocessor steps (`D<name>` for a define, `U<name>` for an undefine).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderVariant {
    preamble: String,
    processes: Vec<String>,
}

impl ShaderVariant {
    /// Create a variant from an explicit preamble and process list
    pub fn new(preamble: impl Into<String>, processes: Vec<String>) -> Self {
        Self {
            preamble: preamble.into(),
            processes,
        }
    }

    /// Add a `#define` to the variant
    pub fn add_define(&mut self, define: &str) -> &mut Self {
        self.processes.push(format!("D{define}"));
        self.preamble.push_str(&format!("#define {}\n", define.replacen('=', " ", 1)));
        self
    }

    /// Add an `#undef` to the variant
    pub fn add_undefine(&mut self, undefine: &str) -> &mut Self {
        self.processes.push(format!("U{undefine}"));
        self.preamble.push_str(&format!("#undef {undefine}\n"));
        self
    }

    /// Add several defines at once
    pub fn add_definitions<'a>(&mut self, definitions: impl IntoIterator<Item = &'a str>) -> &mut Self {
        for definition in definitions {
            self.add_define(definition);
        }
        self
    }

    /// Text prepended to the source
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Ordered preprocessor steps
    pub fn processes(&self) -> &[String] {
        &self.processes
    }
}

/// Everything that identifies a shader module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderModuleKey {
    /// Pipeline stage the module is compiled for
    pub stage: vk::ShaderStageFlags,
    /// Source the module is compiled from
    pub source: ShaderSource,
    /// Name of the entry point function
    pub entry_point: String,
    /// Preprocessor variant
    pub variant: ShaderVariant,
}

impl ShaderModuleKey {
    /// Create a key, checking that the entry point can be handed to the driver
    pub fn new(
        stage: vk::ShaderStageFlags,
        source: ShaderSource,
        entry_point: impl Into<String>,
        variant: ShaderVariant,
    ) -> ResourceResult<Self> {
        let key = Self {
            stage,
            source,
            entry_point: entry_point.into(),
            variant,
        };
        key.validate()?;
        Ok(key)
    }

    /// Check that the entry point is non-empty and free of NUL bytes
    pub fn validate(&self) -> ResourceResult<()> {
        if self.entry_point.is_empty() || self.entry_point.contains('\0') {
            return Err(ResourceError::invalid(format!(
                "shader entry point {:?} must be non-empty and free of NUL bytes",
                self.entry_point
            )));
        }
        Ok(())
    }
}

/// Shader module built by a backend
///
/// Immutable after construction; the native module is destroyed when the last
/// reference is dropped.
pub struct ShaderModule {
    id: ResourceId,
    key: ShaderModuleKey,
    handle: vk::ShaderModule,
    push_constant_size: u32,
    backend: Arc<dyn Backend>,
}

impl ShaderModule {
    /// Build a shader module through the backend
    pub fn new(backend: Arc<dyn Backend>, key: ShaderModuleKey) -> ResourceResult<Self> {
        key.validate()?;

        let CompiledShaderModule {
            handle,
            push_constant_size,
        } = backend
            .create_shader_module(&key)
            .map_err(|source| ResourceError::BuildFailure {
                operation: "Cannot create ShaderModule",
                source,
            })?;

        let id = ResourceId::next();
        log::debug!("[SHADER] Created shader module {} ({:?}, entry {:?})", id, key.stage, key.entry_point);

        Ok(Self {
            id,
            key,
            handle,
            push_constant_size,
            backend,
        })
    }

    /// Identity of this module
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Native handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    /// Pipeline stage
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.key.stage
    }

    /// Entry point name
    pub fn entry_point(&self) -> &str {
        &self.key.entry_point
    }

    /// Source the module was built from
    pub fn source(&self) -> &ShaderSource {
        &self.key.source
    }

    /// Variant the module was built with
    pub fn variant(&self) -> &ShaderVariant {
        &self.key.variant
    }

    /// Size in bytes of the push constant block the module declares (0 if none)
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    /// Full key the module was built from
    pub fn key(&self) -> &ShaderModuleKey {
        &self.key
    }
}

impl fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderModule")
            .field("id", &self.id)
            .field("stage", &self.key.stage)
            .field("entry_point", &self.key.entry_point)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        log::debug!("[SHADER] Dropping shader module {}", self.id);
        self.backend.destroy_shader_module(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_defines_extend_preamble_and_processes() {
        let mut variant = ShaderVariant::default();
        variant.add_define("HAS_NORMAL_TEXTURE").add_define("LIGHT_COUNT=4");
        variant.add_undefine("DEBUG");

        assert_eq!(
            variant.preamble(),
            "#define HAS_NORMAL_TEXTURE\n#define LIGHT_COUNT 4\n#undef DEBUG\n"
        );
        assert_eq!(variant.processes(), ["DHAS_NORMAL_TEXTURE", "DLIGHT_COUNT=4", "UDEBUG"]);
    }

    #[test]
    fn test_variants_distinguish_keys() {
        let source = ShaderSource::new(b"void main() {}".to_vec());
        let plain = ShaderModuleKey::new(vk::ShaderStageFlags::FRAGMENT, source.clone(), "main", ShaderVariant::default())
            .unwrap();

        let mut variant = ShaderVariant::default();
        variant.add_define("ALPHA_TEST");
        let alpha = ShaderModuleKey::new(vk::ShaderStageFlags::FRAGMENT, source, "main", variant).unwrap();

        assert_ne!(plain, alpha);
    }

    #[test]
    fn test_entry_point_with_nul_is_rejected() {
        let result = ShaderModuleKey::new(
            vk::ShaderStageFlags::VERTEX,
            ShaderSource::default(),
            "ma\0in",
            ShaderVariant::default(),
        );

        assert!(matches!(result, Err(ResourceError::InvalidDescription { .. })));
    }
}
