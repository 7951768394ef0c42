/// Line-oriented assembly output buffer.
#[derive(Debug, Default)]
pub struct Assembler {
    output: String,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_output(self) -> String {
        self.output
    }

    /// Pushes a line at column zero (section headers, helper templates)
    pub fn raw(&mut self, string: impl AsRef<str>) {
        self.output.push_str(string.as_ref());
        self.output.push('\n');
    }

    pub fn emit(&mut self, string: impl AsRef<str>) {
        self.output.push_str("    ");
        self.raw(string);
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        self.raw(format!("{}:", name.as_ref()));
    }

    pub fn comment(&mut self, comment: impl AsRef<str>) {
        self.emit(format!("; {}", comment.as_ref()));
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }
}

/// The registers the accumulator pattern touches. The print helpers manage
/// their own registers inside their templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum X86Register {
    Rax,
    Rbx,
    Rdi,
}
