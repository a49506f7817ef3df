//! HLSL front-end seam.
//!
//! Shader modules carry one compiled blob per entry point. HLSL text is
//! compiled through a [`ShaderCompiler`]; on Windows [`Fxc`] wraps
//! `D3DCompile` from `d3dcompiler_47.dll`.

use std::fmt;

use crate::native::Diagnostic;

/// Bytecode of a single entry point.
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledShader {
    bytecode: Vec<u8>,
}

impl CompiledShader {
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode }
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }
}

impl fmt::Debug for CompiledShader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledShader")
            .field("len", &self.bytecode.len())
            .finish()
    }
}

/// Compiles HLSL text for one entry point and target profile.
pub trait ShaderCompiler: Send + Sync {
    fn compile(
        &self,
        source: &str,
        entry_point: &str,
        profile: &str,
    ) -> Result<CompiledShader, Diagnostic>;
}

/// Shader model 5.1 profile of a single pipeline stage.
pub fn stage_profile(stage: crate::ShaderStages) -> Option<&'static str> {
    match stage {
        crate::ShaderStages::VERTEX => Some("vs_5_1"),
        crate::ShaderStages::FRAGMENT => Some("ps_5_1"),
        crate::ShaderStages::COMPUTE => Some("cs_5_1"),
        _ => None,
    }
}

pub(super) fn compile_entry_point(
    compiler: &dyn ShaderCompiler,
    source: &str,
    entry_point: &str,
    stage: crate::ShaderStages,
) -> Result<CompiledShader, crate::ShaderError> {
    let profile = stage_profile(stage).ok_or_else(|| crate::ShaderError::Compilation {
        entry_point: entry_point.to_string(),
        message: format!("entry point must belong to exactly one stage, got {stage:?}"),
    })?;
    profiling::scope!("compile_entry_point");
    let compiled = compiler
        .compile(source, entry_point, profile)
        .map_err(|diagnostic| {
            log::error!(
                "Compiling `{entry_point}` as {profile} failed ({}): {}",
                diagnostic.status,
                diagnostic.message
            );
            crate::ShaderError::Compilation {
                entry_point: entry_point.to_string(),
                message: diagnostic.message,
            }
        })?;
    if compiled.bytecode().is_empty() {
        return Err(crate::ShaderError::Compilation {
            entry_point: entry_point.to_string(),
            message: "compiler produced no bytecode".to_string(),
        });
    }
    log::debug!(
        "Compiled `{entry_point}` as {profile} ({} bytes)",
        compiled.bytecode().len()
    );
    Ok(compiled)
}

#[cfg(windows)]
pub use self::fxc::Fxc;

#[cfg(windows)]
mod fxc {
    use std::ffi::CString;

    use windows::{
        core::PCSTR,
        Win32::Graphics::Direct3D::{Fxc as RawFxc, ID3DBlob},
    };

    use super::CompiledShader;
    use crate::native::{Diagnostic, Status};

    /// `D3DCompile` backed compiler.
    #[derive(Debug, Default)]
    pub struct Fxc {
        /// Compile with debug info and without optimizations.
        pub debug: bool,
    }

    impl Fxc {
        pub fn new(flags: crate::InstanceFlags) -> Self {
            Self {
                debug: flags.contains(crate::InstanceFlags::DEBUG),
            }
        }
    }

    fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
        unsafe { std::slice::from_raw_parts(blob.GetBufferPointer().cast(), blob.GetBufferSize()) }
    }

    impl super::ShaderCompiler for Fxc {
        fn compile(
            &self,
            source: &str,
            entry_point: &str,
            profile: &str,
        ) -> Result<CompiledShader, Diagnostic> {
            profiling::scope!("Fxc::D3DCompile");
            let invalid = |message: String| Diagnostic {
                status: Status::E_INVALIDARG,
                message,
            };
            let raw_ep = CString::new(entry_point).map_err(|e| invalid(e.to_string()))?;
            let raw_profile = CString::new(profile).map_err(|e| invalid(e.to_string()))?;

            let mut compile_flags = RawFxc::D3DCOMPILE_ENABLE_STRICTNESS;
            if self.debug {
                compile_flags |= RawFxc::D3DCOMPILE_DEBUG | RawFxc::D3DCOMPILE_SKIP_OPTIMIZATION;
            }

            let mut shader_data = None;
            let mut error = None;
            let hr = unsafe {
                RawFxc::D3DCompile(
                    source.as_ptr().cast(),
                    source.len(),
                    PCSTR::null(),
                    None,
                    None,
                    PCSTR(raw_ep.as_ptr().cast()),
                    PCSTR(raw_profile.as_ptr().cast()),
                    compile_flags,
                    0,
                    &mut shader_data,
                    Some(&mut error),
                )
            };

            match (hr, shader_data) {
                (Ok(()), Some(blob)) => Ok(CompiledShader::new(blob_bytes(&blob).to_vec())),
                (result, _) => {
                    let status = match result {
                        Ok(()) => Status::E_FAIL,
                        Err(e) => Status(e.code().0),
                    };
                    let message = match error {
                        Some(ref error) => String::from_utf8_lossy(blob_bytes(error)).into_owned(),
                        None => format!("D3DCompile failed with {status}"),
                    };
                    Err(Diagnostic { status, message })
                }
            }
        }
    }
}
