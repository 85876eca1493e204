use super::{Gl, GpuError, ShaderStage, current_binding};
use glow::HasContext;
use log::{error, info};
use std::{collections::BTreeMap, fmt::Display};

const GLSL_VERSION: &str = "#version 330";

/// A GLSL program built from per-stage sources plus a shared set of
/// `#define`s.
pub struct Program {
    gl: Gl,
    handle: glow::Program,
    shaders: BTreeMap<ShaderStage, glow::Shader>,
    defines: BTreeMap<String, String>,
}

impl Program {
    pub fn new(gl: &Gl) -> Result<Self, GpuError> {
        let handle = unsafe { gl.create_program()? };
        Ok(Self {
            gl: gl.clone(),
            handle,
            shaders: BTreeMap::new(),
            defines: BTreeMap::new(),
        })
    }

    /// Adds or replaces a define. An empty value removes it. Applies to
    /// stages compiled afterwards.
    pub fn set_define(&mut self, name: &str, value: impl Display) {
        set_define(&mut self.defines, name, value);
    }

    pub fn compile(&mut self, stage: ShaderStage, name: &str, source: &str) -> Result<(), GpuError> {
        let gl = &self.gl;
        let code = format!("{}{}", prefix_code(&self.defines), source);
        unsafe {
            let shader = gl.create_shader(stage.gl_type())?;
            gl.shader_source(shader, &code);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                error!("Compile Shader '{name}':\n{log}");
                return Err(GpuError::ShaderCompile {
                    name: name.to_string(),
                    log,
                });
            }
            gl.attach_shader(self.handle, shader);
            if let Some(previous) = self.shaders.insert(stage, shader) {
                gl.detach_shader(self.handle, previous);
                gl.delete_shader(previous);
            }
        }
        Ok(())
    }

    /// Must be called before `link`.
    pub fn set_attrib_location(&self, name: &str, index: u32) {
        unsafe { self.gl.bind_attrib_location(self.handle, index, name) };
    }

    /// Must be called before `link`.
    pub fn set_frag_output(&self, name: &str, index: u32) {
        unsafe { self.gl.bind_frag_data_location(self.handle, index, name) };
    }

    pub fn link(&self, name: &str) -> Result<(), GpuError> {
        let gl = &self.gl;
        unsafe {
            gl.link_program(self.handle);
            if !gl.get_program_link_status(self.handle) {
                let log = gl.get_program_info_log(self.handle);
                error!("Link Shader '{name}':\n{log}");
                return Err(GpuError::ProgramLink {
                    name: name.to_string(),
                    log,
                });
            }
        }
        info!("Linked program '{name}' ({} stage(s)).", self.shaders.len());
        Ok(())
    }

    /// Binds a named uniform block to a binding point. Blocks the linker
    /// optimized away are skipped.
    pub fn set_uniform_block(&self, name: &str, binding: u32) {
        unsafe {
            if let Some(index) = self.gl.get_uniform_block_index(self.handle, name) {
                self.gl.uniform_block_binding(self.handle, index, binding);
            }
        }
    }

    /// Points a sampler uniform at a texture unit. Absent uniforms are skipped.
    pub fn set_sampler_unit(&self, name: &str, unit: i32) {
        let gl = &self.gl;
        unsafe {
            let Some(location) = gl.get_uniform_location(self.handle, name) else {
                return;
            };
            let old = current_binding(gl, glow::CURRENT_PROGRAM, glow::NativeProgram);
            gl.use_program(Some(self.handle));
            gl.uniform_1_i32(Some(&location), unit);
            gl.use_program(old);
        }
    }

    #[inline(always)]
    pub fn raw(&self) -> glow::Program {
        self.handle
    }

    #[inline(always)]
    pub fn handle(&self) -> u32 {
        self.handle.0.get()
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_program(self.handle);
            for shader in self.shaders.values() {
                self.gl.delete_shader(*shader);
            }
        }
    }
}

fn set_define(defines: &mut BTreeMap<String, String>, name: &str, value: impl Display) {
    let value = value.to_string();
    if value.is_empty() {
        defines.remove(name);
    } else {
        defines.insert(name.to_string(), value);
    }
}

/// Version header, one `#define` per entry in name order, then a line reset
/// so compiler messages refer to lines of the stage source.
fn prefix_code(defines: &BTreeMap<String, String>) -> String {
    let mut prefix = String::with_capacity(32 + defines.len() * 24);
    prefix.push_str(GLSL_VERSION);
    prefix.push('\n');
    for (name, value) in defines {
        prefix.push_str("#define ");
        prefix.push_str(name);
        prefix.push(' ');
        prefix.push_str(value);
        prefix.push('\n');
    }
    prefix.push_str("#line 1\n");
    prefix
}

#[cfg(test)]
mod tests {
    use super::{prefix_code, set_define};
    use std::collections::BTreeMap;

    #[test]
    fn prefix_without_defines_is_version_and_line_reset() {
        assert_eq!(prefix_code(&BTreeMap::new()), "#version 330\n#line 1\n");
    }

    #[test]
    fn defines_are_emitted_in_name_order() {
        let mut defines = BTreeMap::new();
        set_define(&mut defines, "MAX_FACES", 200);
        set_define(&mut defines, "ALPHA_TEST", 0.5f32);
        set_define(&mut defines, "USE_FUZZ", "1");
        assert_eq!(
            prefix_code(&defines),
            "#version 330\n#define ALPHA_TEST 0.5\n#define MAX_FACES 200\n#define USE_FUZZ 1\n#line 1\n"
        );
    }

    #[test]
    fn empty_value_removes_define() {
        let mut defines = BTreeMap::new();
        set_define(&mut defines, "USE_FUZZ", 1);
        set_define(&mut defines, "USE_FUZZ", "");
        assert!(defines.is_empty());
        set_define(&mut defines, "MISSING", "");
        assert!(defines.is_empty());
    }
}
