//! Shader source to SPIR-V

use std::io::Cursor;

use ash::vk;

use crate::error::{BackendError, BackendResult};
use crate::resources::ShaderModuleKey;

/// SPIR-V words plus the reflection data the backend needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledSpirv {
    /// SPIR-V code
    pub code: Vec<u32>,
    /// Size in bytes of the push constant block, 0 if none
    pub push_constant_size: u32,
}

/// Turns a shader source and variant into SPIR-V
pub trait ShaderCompiler: Send + Sync {
    /// Compile the source of `key` for its stage, entry point and variant
    fn compile(&self, key: &ShaderModuleKey) -> BackendResult<CompiledSpirv>;
}

/// Treats shader sources as precompiled SPIR-V
///
/// SPIR-V has no preprocessor, so a source carrying a non-empty variant is
/// rejected. No reflection is performed; every module reports a push constant
/// size of `push_constant_size`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpirvPassthrough {
    push_constant_size: u32,
}

impl SpirvPassthrough {
    /// Passthrough reporting no push constants
    pub const fn new() -> Self {
        Self { push_constant_size: 0 }
    }

    /// Passthrough reporting a fixed push constant block size for every module
    pub const fn with_push_constant_size(push_constant_size: u32) -> Self {
        Self { push_constant_size }
    }
}

impl ShaderCompiler for SpirvPassthrough {
    fn compile(&self, key: &ShaderModuleKey) -> BackendResult<CompiledSpirv> {
        if !key.variant.processes().is_empty() {
            return Err(BackendError::new(
                vk::Result::ERROR_INITIALIZATION_FAILED,
                "precompiled SPIR-V cannot apply shader variant definitions",
            ));
        }

        let code = ash::util::read_spv(&mut Cursor::new(key.source.data())).map_err(|e| {
            log::error!("[SHADER] Source is not valid SPIR-V: {}", e);
            BackendError::new(vk::Result::ERROR_INITIALIZATION_FAILED, format!("invalid SPIR-V: {e}"))
        })?;

        log::debug!("[SHADER] SPIR-V contains {} u32 words", code.len());

        Ok(CompiledSpirv {
            code,
            push_constant_size: self.push_constant_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ShaderSource, ShaderVariant};

    fn key(data: Vec<u8>, variant: ShaderVariant) -> ShaderModuleKey {
        ShaderModuleKey::new(vk::ShaderStageFlags::VERTEX, ShaderSource::new(data), "main", variant).unwrap()
    }

    #[test]
    fn test_passthrough_reads_spirv_words() {
        let mut data = 0x0723_0203_u32.to_le_bytes().to_vec();
        data.extend_from_slice(&0x0001_0000_u32.to_le_bytes());

        let compiled = SpirvPassthrough::with_push_constant_size(64)
            .compile(&key(data, ShaderVariant::default()))
            .unwrap();

        assert_eq!(compiled.code, vec![0x0723_0203, 0x0001_0000]);
        assert_eq!(compiled.push_constant_size, 64);
    }

    #[test]
    fn test_passthrough_rejects_misaligned_source() {
        let result = SpirvPassthrough::new().compile(&key(vec![0x03, 0x02, 0x23], ShaderVariant::default()));

        assert!(result.is_err());
    }

    #[test]
    fn test_passthrough_rejects_variants() {
        let mut variant = ShaderVariant::default();
        variant.add_define("SKINNED");
        let result = SpirvPassthrough::new().compile(&key(0x0723_0203_u32.to_le_bytes().to_vec(), variant));

        assert!(result.is_err());
    }
}
