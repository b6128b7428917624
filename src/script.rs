//! The compiled-script contract.
//!
//! A [`Script`] is an opaque executable unit produced by an external
//! compilation pipeline. The simulation core never looks inside it; it only
//! consumes the declared surface:
//!
//! - the attribute columns the script reads/writes (layout validation),
//! - declared parameters and internal constants (parameter-store setup),
//! - data-interface slots and external-function binding requests,
//! - whether the script is an interpolated spawn script (previous-value
//!   parameter shadowing),
//! - per-target compile status, and the executables themselves: a CPU
//!   kernel behind [`VectorKernel`] and/or WGSL source for the GPU path.
//!
//! Scripts are built once and shared: emitters hold `Arc<Script>`.

use std::sync::{Arc, RwLock};

use crate::attribute::Variable;
use crate::data_interface::ExternalFunctionRequest;
use crate::param_store::{ParameterStore, ParameterValue};
use crate::vm::VectorKernel;

/// Where a script executes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SimTarget {
    /// Vectorized CPU dispatch through the byte-code VM.
    #[default]
    Cpu,
    /// Deferred compute dispatch through the render-thread batcher.
    Gpu,
}

/// Compilation status of one target's executable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompileStatus {
    /// No executable yet.
    #[default]
    Pending,
    /// Executable present and usable.
    Compiled,
    /// Compilation failed; the script must not run on this target.
    Failed,
}

/// An opaque compiled script.
pub struct Script {
    name: String,
    attributes: Vec<Variable>,
    parameters: Vec<(Variable, ParameterValue)>,
    data_interfaces: Vec<String>,
    external_functions: Vec<ExternalFunctionRequest>,
    interpolated_spawn: bool,
    reads_attributes: bool,
    cpu_kernel: Option<Arc<dyn VectorKernel>>,
    cpu_status: CompileStatus,
    gpu_source: Option<String>,
    gpu_status: CompileStatus,
    tunables: RwLock<ParameterStore>,
}

impl Script {
    /// Start building a script.
    pub fn new(name: impl Into<String>) -> ScriptBuilder {
        ScriptBuilder {
            script: Script {
                name: name.into(),
                attributes: Vec::new(),
                parameters: Vec::new(),
                data_interfaces: Vec::new(),
                external_functions: Vec::new(),
                interpolated_spawn: false,
                reads_attributes: false,
                cpu_kernel: None,
                cpu_status: CompileStatus::Pending,
                gpu_source: None,
                gpu_status: CompileStatus::Pending,
                tunables: RwLock::new(ParameterStore::new()),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute columns the script consumes/produces, in layout order.
    pub fn attributes(&self) -> &[Variable] {
        &self.attributes
    }

    /// Declared parameters with their compiled-in defaults.
    pub fn parameters(&self) -> &[(Variable, ParameterValue)] {
        &self.parameters
    }

    /// Declared data-interface slot names.
    pub fn data_interfaces(&self) -> &[String] {
        &self.data_interfaces
    }

    /// External function bindings the execution context must resolve.
    pub fn external_functions(&self) -> &[ExternalFunctionRequest] {
        &self.external_functions
    }

    /// Whether this is an interpolated spawn script (previous-value
    /// parameter shadowing required).
    pub fn is_interpolated_spawn(&self) -> bool {
        self.interpolated_spawn
    }

    /// Whether the script reads attribute data. A spawn script must not.
    pub fn reads_attributes(&self) -> bool {
        self.reads_attributes
    }

    /// Compile status for a target.
    pub fn compile_status(&self, target: SimTarget) -> CompileStatus {
        match target {
            SimTarget::Cpu => self.cpu_status,
            SimTarget::Gpu => self.gpu_status,
        }
    }

    /// Whether compilation succeeded for a target.
    pub fn did_compile_succeed(&self, target: SimTarget) -> bool {
        self.compile_status(target) == CompileStatus::Compiled
    }

    /// The CPU executable, if compiled.
    pub fn cpu_kernel(&self) -> Option<&Arc<dyn VectorKernel>> {
        self.cpu_kernel.as_ref()
    }

    /// The GPU shader source, if compiled.
    pub fn gpu_source(&self) -> Option<&str> {
        self.gpu_source.as_deref()
    }

    /// Externally tunable (rapid-iteration) parameters shared by every
    /// instance of this script.
    pub fn tunables(&self) -> &RwLock<ParameterStore> {
        &self.tunables
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("attributes", &self.attributes.len())
            .field("parameters", &self.parameters.len())
            .field("cpu_status", &self.cpu_status)
            .field("gpu_status", &self.gpu_status)
            .finish()
    }
}

/// Builder for [`Script`]. Chain configuration, then call `.build()`.
pub struct ScriptBuilder {
    script: Script,
}

impl ScriptBuilder {
    /// Declare an attribute column.
    pub fn with_attribute(mut self, var: Variable) -> Self {
        if !self.script.attributes.contains(&var) {
            self.script.attributes.push(var);
        }
        self
    }

    /// Declare several attribute columns.
    pub fn with_attributes(mut self, vars: impl IntoIterator<Item = Variable>) -> Self {
        for v in vars {
            self = self.with_attribute(v);
        }
        self
    }

    /// Declare a parameter with its default value.
    pub fn with_parameter(mut self, var: Variable, value: ParameterValue) -> Self {
        self.script.parameters.push((var, value));
        self
    }

    /// Declare an externally tunable parameter.
    pub fn with_tunable(self, var: Variable, value: ParameterValue) -> Self {
        self.script
            .tunables
            .write()
            .expect("tunables lock")
            .add_parameter(var.clone(), value);
        self.with_parameter(var, value)
    }

    /// Declare a data-interface slot.
    pub fn with_data_interface(mut self, name: impl Into<String>) -> Self {
        self.script.data_interfaces.push(name.into());
        self
    }

    /// Declare an external function binding request.
    pub fn with_external_function(mut self, name: impl Into<String>, slot: usize) -> Self {
        self.script
            .external_functions
            .push(ExternalFunctionRequest::new(name, slot));
        self
    }

    /// Mark as an interpolated spawn script.
    pub fn with_interpolated_spawn(mut self) -> Self {
        self.script.interpolated_spawn = true;
        self
    }

    /// Mark as reading attribute data.
    pub fn with_reads_attributes(mut self) -> Self {
        self.script.reads_attributes = true;
        self
    }

    /// Attach the compiled CPU kernel.
    pub fn with_cpu_kernel(mut self, kernel: Arc<dyn VectorKernel>) -> Self {
        self.script.cpu_kernel = Some(kernel);
        self.script.cpu_status = CompileStatus::Compiled;
        self
    }

    /// Attach compiled GPU shader source.
    pub fn with_gpu_source(mut self, wgsl: impl Into<String>) -> Self {
        self.script.gpu_source = Some(wgsl.into());
        self.script.gpu_status = CompileStatus::Compiled;
        self
    }

    /// Record a failed compile for a target (from the external pipeline).
    pub fn with_compile_failure(mut self, target: SimTarget) -> Self {
        match target {
            SimTarget::Cpu => {
                self.script.cpu_kernel = None;
                self.script.cpu_status = CompileStatus::Failed;
            }
            SimTarget::Gpu => {
                self.script.gpu_source = None;
                self.script.gpu_status = CompileStatus::Failed;
            }
        }
        self
    }

    /// Finish, wrapping in the `Arc` everything downstream expects.
    pub fn build(self) -> Arc<Script> {
        Arc::new(self.script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::KernelBatch;

    #[test]
    fn test_compile_status() {
        let noop = |_b: &mut KernelBatch<'_>| {};
        let script = Script::new("spawn")
            .with_attribute(Variable::vec3("position"))
            .with_cpu_kernel(Arc::new(noop))
            .build();
        assert!(script.did_compile_succeed(SimTarget::Cpu));
        assert!(!script.did_compile_succeed(SimTarget::Gpu));
        assert_eq!(script.compile_status(SimTarget::Gpu), CompileStatus::Pending);
    }

    #[test]
    fn test_compile_failure_clears_kernel() {
        let noop = |_b: &mut KernelBatch<'_>| {};
        let script = Script::new("broken")
            .with_cpu_kernel(Arc::new(noop))
            .with_compile_failure(SimTarget::Cpu)
            .build();
        assert!(script.cpu_kernel().is_none());
        assert_eq!(script.compile_status(SimTarget::Cpu), CompileStatus::Failed);
    }

    #[test]
    fn test_duplicate_attributes_collapse() {
        let script = Script::new("s")
            .with_attribute(Variable::float("age"))
            .with_attribute(Variable::float("age"))
            .build();
        assert_eq!(script.attributes().len(), 1);
    }
}
