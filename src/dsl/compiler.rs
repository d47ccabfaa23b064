use super::ast::{AssignOp, BinOp, DeclKind, Expr, ExprKind, LogicalOp, Program, Span, Stmt, UnaryOp};
use super::builtins::{self, Builtin};
use super::error::CompileError;

/// Interned field names every program starts with.
const PREDEFINED_NAMES: [&str; 7] = ["r", "g", "b", "originx", "originz", "worldx", "worldz"];

/// Name ids of the color channels read by the raster.
pub const NAME_R: u16 = 0;
pub const NAME_G: u16 = 1;
pub const NAME_B: u16 = 2;
/// Name ids of the fields of the `variable` namespace, in order
/// `originx, originz, worldx, worldz`.
pub const VARIABLE_FIELDS: [u16; 4] = [3, 4, 5, 6];

/// Local slots filled by the VM before the first instruction runs.
pub const SLOT_X: u16 = 0;
pub const SLOT_Y: u16 = 1;
pub const SLOT_VARIABLE: u16 = 2;
const RESERVED_SLOTS: u16 = 3;

/// A compiled program ready for VM execution.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub ops: Vec<Op>,
    pub constants: Vec<f64>,
    /// Interned field names, indexed by the `u16` of field ops.
    pub names: Vec<String>,
    /// Runtime error messages raised by `Op::Fail`.
    pub messages: Vec<String>,
    /// Number of local variable slots needed.
    pub local_count: u16,
}

impl CompiledProgram {
    pub fn name(&self, id: u16) -> &str {
        self.names.get(id as usize).map_or("?", String::as_str)
    }
}

/// Bytecode operations for the stack-based VM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Push a constant from the constant pool.
    PushConst(u16),
    PushUndefined,
    PushNull,
    PushTrue,
    PushFalse,
    /// Load a local variable onto the stack.
    LoadLocal(u16),
    /// Pop top of stack into a local variable slot.
    StoreLocal(u16),
    /// Pop top of stack.
    Pop,
    /// Duplicate top of stack.
    Dup,

    // Objects
    /// Push a new empty object.
    NewObject,
    /// Pop value, set it as a field of the object now on top (object stays).
    InitField(u16),
    /// Pop object → push field value.
    GetField(u16),
    /// Pop value, pop object, write the field.
    SetField(u16),

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    /// Unary `+`: convert to number.
    Plus,

    // Comparison
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,

    // Logic
    Not,

    /// Pop N args → push the builtin's numeric result.
    Call(Builtin, u8),
    /// Raise the runtime error with this message index.
    Fail(u16),

    // Control flow
    /// Pop condition, jump if falsy.
    JumpIfFalse(u16),
    /// Jump if top is falsy, keeping it; otherwise pop it (`&&`).
    JumpIfFalseKeep(u16),
    /// Jump if top is truthy, keeping it; otherwise pop it (`||`).
    JumpIfTrueKeep(u16),
    /// Unconditional jump.
    Jump(u16),

    /// Halt execution, top of stack is the result.
    Return,
}

pub fn compile(program: &Program) -> Result<CompiledProgram, Vec<CompileError>> {
    let mut compiler = Compiler::new();

    compiler.compile_stmts(&program.body);

    // Falling off the end yields 0 (black).
    if let Err(e) = compiler.emit_const(0.0) {
        compiler.errors.push(e);
    }
    compiler.emit(Op::Return);

    if compiler.ops.len() > usize::from(u16::MAX) {
        compiler.errors.push(CompileError::compiler(
            "Bytecode too large (max 65535 ops)",
            Span::new(0, 0),
        ));
    }

    if !compiler.errors.is_empty() {
        return Err(compiler.errors);
    }

    Ok(CompiledProgram {
        ops: compiler.ops,
        constants: compiler.constants,
        names: compiler.names,
        messages: compiler.messages,
        local_count: compiler.local_count,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Math,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Local { slot: u16, constant: bool },
    Namespace(Namespace),
}

struct Compiler {
    ops: Vec<Op>,
    constants: Vec<f64>,
    names: Vec<String>,
    messages: Vec<String>,
    local_count: u16,
    /// Lexical scopes, innermost last. The first scope holds the injected
    /// bindings and the program's top-level declarations.
    scopes: Vec<Vec<(String, Binding)>>,
    errors: Vec<CompileError>,
}

impl Compiler {
    fn new() -> Self {
        let root = vec![
            ("x".to_string(), Binding::Local { slot: SLOT_X, constant: false }),
            ("y".to_string(), Binding::Local { slot: SLOT_Y, constant: false }),
            ("math".to_string(), Binding::Namespace(Namespace::Math)),
            ("query".to_string(), Binding::Namespace(Namespace::Query)),
            ("variable".to_string(), Binding::Local { slot: SLOT_VARIABLE, constant: true }),
            ("v".to_string(), Binding::Local { slot: SLOT_VARIABLE, constant: true }),
            ("q".to_string(), Binding::Namespace(Namespace::Query)),
        ];
        Self {
            ops: Vec::new(),
            constants: Vec::new(),
            names: PREDEFINED_NAMES.iter().map(|s| (*s).to_string()).collect(),
            messages: Vec::new(),
            local_count: RESERVED_SLOTS,
            scopes: vec![root],
            errors: Vec::new(),
        }
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn emit_const(&mut self, value: f64) -> Result<(), CompileError> {
        let idx = self.add_constant(value)?;
        self.emit(Op::PushConst(idx));
        Ok(())
    }

    fn add_constant(&mut self, value: f64) -> Result<u16, CompileError> {
        // Check if constant already exists (exact bit equality)
        for (i, &c) in self.constants.iter().enumerate() {
            if c.to_bits() == value.to_bits() {
                return Ok(i as u16);
            }
        }
        let idx = u16::try_from(self.constants.len()).map_err(|_| {
            CompileError::compiler("Too many constants (max 65535)", Span::new(0, 0))
        })?;
        self.constants.push(value);
        Ok(idx)
    }

    fn intern(&mut self, name: &str, span: Span) -> Result<u16, CompileError> {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return Ok(i as u16);
        }
        let idx = u16::try_from(self.names.len()).map_err(|_| {
            CompileError::compiler("Too many field names (max 65535)", span)
        })?;
        self.names.push(name.to_string());
        Ok(idx)
    }

    fn emit_fail(&mut self, message: String, span: Span) -> Result<(), CompileError> {
        let idx = u16::try_from(self.messages.len()).map_err(|_| {
            CompileError::compiler("Too many runtime error sites (max 65535)", span)
        })?;
        self.messages.push(message);
        self.emit(Op::Fail(idx));
        Ok(())
    }

    fn current_offset(&self) -> usize {
        self.ops.len()
    }

    fn offset_u16(offset: usize) -> Result<u16, CompileError> {
        u16::try_from(offset).map_err(|_| {
            CompileError::compiler("Bytecode too large (max 65535 ops)", Span::new(0, 0))
        })
    }

    fn patch_jump(&mut self, idx: usize) -> Result<(), CompileError> {
        let target = Self::offset_u16(self.ops.len())?;
        match &mut self.ops[idx] {
            Op::JumpIfFalse(ref mut dest)
            | Op::JumpIfFalseKeep(ref mut dest)
            | Op::JumpIfTrueKeep(ref mut dest)
            | Op::Jump(ref mut dest) => *dest = target,
            _ => {}
        }
        Ok(())
    }

    // ── Scopes ────────────────────────────────────────────────────

    fn resolve(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, b)| *b)
    }

    fn declare(&mut self, name: &str, constant: bool, span: Span) -> Result<u16, CompileError> {
        let Some(scope) = self.scopes.last() else {
            return Err(CompileError::compiler("No open scope", span));
        };
        if scope.iter().any(|(n, _)| n == name) {
            return Err(CompileError::name(
                format!("Identifier '{name}' has already been declared"),
                span,
            ));
        }
        let slot = self.local_count;
        self.local_count = slot.checked_add(1).ok_or_else(|| {
            CompileError::compiler("Too many local variables (max 65535)", span)
        })?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), Binding::Local { slot, constant }));
        }
        Ok(slot)
    }

    /// Run `f` inside a fresh lexical scope; the scope is closed on every path.
    fn scoped<F>(&mut self, f: F) -> Result<(), CompileError>
    where
        F: FnOnce(&mut Self) -> Result<(), CompileError>,
    {
        self.scopes.push(Vec::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// If `expr` names a namespace, return it with the spelling used.
    fn namespace_of<'e>(&self, expr: &'e Expr) -> Option<(Namespace, &'e str)> {
        match &expr.kind {
            ExprKind::Ident(name) => match self.resolve(name) {
                Some(Binding::Namespace(ns)) => Some((ns, name.as_str())),
                _ => None,
            },
            _ => None,
        }
    }

    // ── Statements ────────────────────────────────────────────────

    /// Compile a statement list, collecting errors so every bad statement is
    /// reported in one pass.
    fn compile_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Err(e) = self.compile_stmt(stmt) {
                self.errors.push(e);
            }
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Decl { kind, name, value, span } => {
                match value {
                    Some(v) => self.compile_expr(v)?,
                    None => self.emit(Op::PushUndefined),
                }
                let slot = self.declare(name, *kind == DeclKind::Const, *span)?;
                self.emit(Op::StoreLocal(slot));
                Ok(())
            }
            Stmt::Assign { target, op, value, .. } => self.compile_assign(target, *op, value),
            Stmt::Update { target, delta, span } => {
                let one = Expr { kind: ExprKind::Number(*delta), span: *span };
                self.compile_assign(target, AssignOp::Add, &one)
            }
            Stmt::If { condition, then_branch, else_branch, .. } => {
                self.compile_expr(condition)?;
                let jump_else = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.compile_branch(then_branch)?;
                if let Some(else_branch) = else_branch {
                    let jump_end = self.current_offset();
                    self.emit(Op::Jump(0));
                    self.patch_jump(jump_else)?;
                    self.compile_branch(else_branch)?;
                    self.patch_jump(jump_end)?;
                } else {
                    self.patch_jump(jump_else)?;
                }
                Ok(())
            }
            Stmt::While { condition, body, .. } => {
                let loop_start = Self::offset_u16(self.current_offset())?;
                self.compile_expr(condition)?;
                let jump_end = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.compile_branch(body)?;
                self.emit(Op::Jump(loop_start));
                self.patch_jump(jump_end)
            }
            Stmt::For { init, condition, update, body, .. } => self.scoped(|c| {
                if let Some(init) = init {
                    c.compile_stmt(init)?;
                }
                let loop_start = Self::offset_u16(c.current_offset())?;
                let jump_end = match condition {
                    Some(cond) => {
                        c.compile_expr(cond)?;
                        let at = c.current_offset();
                        c.emit(Op::JumpIfFalse(0));
                        Some(at)
                    }
                    None => None,
                };
                c.compile_branch(body)?;
                if let Some(update) = update {
                    c.compile_stmt(update)?;
                }
                c.emit(Op::Jump(loop_start));
                if let Some(at) = jump_end {
                    c.patch_jump(at)?;
                }
                Ok(())
            }),
            Stmt::Return { value, .. } => {
                match value {
                    Some(v) => self.compile_expr(v)?,
                    None => self.emit(Op::PushUndefined),
                }
                self.emit(Op::Return);
                Ok(())
            }
            Stmt::Block { stmts, .. } => self.scoped(|c| {
                c.compile_stmts(stmts);
                Ok(())
            }),
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop);
                Ok(())
            }
        }
    }

    /// The body of `if`/`while`/`for` gets its own scope even when it is a
    /// single statement.
    fn compile_branch(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.scoped(|c| c.compile_stmt(stmt))
    }

    fn compile_assign(&mut self, target: &Expr, op: AssignOp, value: &Expr) -> Result<(), CompileError> {
        match &target.kind {
            ExprKind::Ident(name) => match self.resolve(name) {
                Some(Binding::Local { slot, constant: false }) => {
                    if op != AssignOp::Set {
                        self.emit(Op::LoadLocal(slot));
                    }
                    self.compile_expr(value)?;
                    self.emit_assign_op(op);
                    self.emit(Op::StoreLocal(slot));
                    Ok(())
                }
                Some(Binding::Local { constant: true, .. }) => Err(CompileError::name(
                    format!("Assignment to constant variable '{name}'"),
                    target.span,
                )),
                Some(Binding::Namespace(_)) => Err(CompileError::name(
                    format!("Cannot assign to namespace '{name}'"),
                    target.span,
                )),
                None => Err(CompileError::name(
                    format!("'{name}' is not defined"),
                    target.span,
                )),
            },
            ExprKind::Field { object, field } => {
                if let Some((_, ns_name)) = self.namespace_of(object) {
                    return Err(CompileError::name(
                        format!("Cannot assign to '{ns_name}.{field}': '{ns_name}' is read-only"),
                        target.span,
                    ));
                }
                let id = self.intern(field, target.span)?;
                self.compile_expr(object)?;
                if op != AssignOp::Set {
                    self.emit(Op::Dup);
                    self.emit(Op::GetField(id));
                }
                self.compile_expr(value)?;
                self.emit_assign_op(op);
                self.emit(Op::SetField(id));
                Ok(())
            }
            _ => Err(CompileError::parser("Invalid assignment target", target.span)),
        }
    }

    fn emit_assign_op(&mut self, op: AssignOp) {
        match op {
            AssignOp::Set => {}
            AssignOp::Add => self.emit(Op::Add),
            AssignOp::Sub => self.emit(Op::Sub),
            AssignOp::Mul => self.emit(Op::Mul),
            AssignOp::Div => self.emit(Op::Div),
            AssignOp::Mod => self.emit(Op::Mod),
        }
    }

    // ── Expressions ───────────────────────────────────────────────

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Number(v) => self.emit_const(*v)?,
            ExprKind::Bool(true) => self.emit(Op::PushTrue),
            ExprKind::Bool(false) => self.emit(Op::PushFalse),
            ExprKind::Null => self.emit(Op::PushNull),
            ExprKind::Undefined => self.emit(Op::PushUndefined),
            ExprKind::Ident(name) => match self.resolve(name) {
                Some(Binding::Local { slot, .. }) => self.emit(Op::LoadLocal(slot)),
                Some(Binding::Namespace(_)) => {
                    return Err(CompileError::name(
                        format!("'{name}' is a namespace and cannot be used as a value"),
                        expr.span,
                    ));
                }
                None => {
                    return Err(CompileError::name(
                        format!("'{name}' is not defined"),
                        expr.span,
                    ));
                }
            },
            ExprKind::Field { object, field } => {
                if let Some((ns, ns_name)) = self.namespace_of(object) {
                    return self.compile_namespace_read(ns, ns_name, field, expr.span);
                }
                self.compile_expr(object)?;
                let id = self.intern(field, expr.span)?;
                self.emit(Op::GetField(id));
            }
            ExprKind::Call { callee, args } => self.compile_call(callee, args, expr.span)?,
            ExprKind::Object(fields) => {
                self.emit(Op::NewObject);
                for (name, value) in fields {
                    self.compile_expr(value)?;
                    let id = self.intern(name, value.span)?;
                    self.emit(Op::InitField(id));
                }
            }
            ExprKind::BinOp { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(match op {
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    BinOp::Mod => Op::Mod,
                    BinOp::Pow => Op::Pow,
                    BinOp::Lt => Op::Lt,
                    BinOp::Gt => Op::Gt,
                    BinOp::Le => Op::Le,
                    BinOp::Ge => Op::Ge,
                    BinOp::Eq => Op::Eq,
                    BinOp::Ne => Op::Ne,
                    BinOp::StrictEq => Op::StrictEq,
                    BinOp::StrictNe => Op::StrictNe,
                });
            }
            ExprKind::UnaryOp { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Plus => Op::Plus,
                    UnaryOp::Not => Op::Not,
                });
            }
            ExprKind::Logical { op, left, right } => {
                self.compile_expr(left)?;
                let jump = self.current_offset();
                self.emit(match op {
                    LogicalOp::And => Op::JumpIfFalseKeep(0),
                    LogicalOp::Or => Op::JumpIfTrueKeep(0),
                });
                self.compile_expr(right)?;
                self.patch_jump(jump)?;
            }
            ExprKind::Conditional { condition, then_expr, else_expr } => {
                self.compile_expr(condition)?;
                let jump_else = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.compile_expr(then_expr)?;
                let jump_end = self.current_offset();
                self.emit(Op::Jump(0));
                self.patch_jump(jump_else)?;
                self.compile_expr(else_expr)?;
                self.patch_jump(jump_end)?;
            }
        }
        Ok(())
    }

    /// `math.pi`, `math.floor` without a call, `q.whatever`.
    fn compile_namespace_read(&mut self, ns: Namespace, ns_name: &str, field: &str, span: Span) -> Result<(), CompileError> {
        if ns == Namespace::Math {
            if let Some(c) = builtins::lookup_math_const(field) {
                return self.emit_const(c.value);
            }
        }
        let is_fn = match ns {
            Namespace::Math => builtins::lookup_math(field).is_some(),
            Namespace::Query => builtins::lookup_query(field).is_some(),
        };
        if is_fn {
            return Err(CompileError::name(
                format!("'{ns_name}.{field}' is a function and must be called"),
                span,
            ));
        }
        self.emit(Op::PushUndefined);
        Ok(())
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Result<(), CompileError> {
        let member = match &callee.kind {
            ExprKind::Field { object, field } => self
                .namespace_of(object)
                .map(|(ns, ns_name)| (ns, ns_name, field.as_str())),
            _ => None,
        };
        let Some((ns, ns_name, field)) = member else {
            return Err(CompileError::name(
                "Only math.* and query.* functions can be called",
                callee.span,
            ));
        };

        let argc = u8::try_from(args.len()).map_err(|_| {
            CompileError::compiler("Too many arguments (max 255)", span)
        })?;
        for arg in args {
            self.compile_expr(arg)?;
        }

        let target = match ns {
            Namespace::Math => builtins::lookup_math(field),
            Namespace::Query => builtins::lookup_query(field),
        };
        match target {
            Some(f) => self.emit(Op::Call(f.func, argc)),
            None => self.emit_fail(format!("{ns_name}.{field} is not a function"), span)?,
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::builtins::MathFn;
    use crate::dsl::error::ErrorKind;
    use crate::dsl::lexer::lex;
    use crate::dsl::parser::parse;

    fn compile_src(src: &str) -> CompiledProgram {
        let tokens = lex(src).unwrap();
        let program = parse(tokens).unwrap();
        compile(&program).unwrap()
    }

    fn compile_errs(src: &str) -> Vec<CompileError> {
        let tokens = lex(src).unwrap();
        let program = parse(tokens).unwrap();
        compile(&program).unwrap_err()
    }

    #[test]
    fn implicit_return_is_zero() {
        let compiled = compile_src("let a = 1");
        let n = compiled.ops.len();
        assert_eq!(compiled.ops[n - 1], Op::Return);
        let Op::PushConst(idx) = compiled.ops[n - 2] else {
            panic!("expected trailing PushConst");
        };
        assert_eq!(compiled.constants[idx as usize], 0.0);
    }

    #[test]
    fn constant_dedup() {
        let compiled = compile_src("return { r: 1, g: 1, b: 1 }");
        // 1.0 should appear only once in the constant pool
        let ones = compiled.constants.iter().filter(|&&c| c == 1.0).count();
        assert_eq!(ones, 1, "Duplicate constants should be deduplicated");
    }

    #[test]
    fn coordinates_are_reserved_locals() {
        let compiled = compile_src("return x + y");
        assert!(compiled.ops.contains(&Op::LoadLocal(SLOT_X)));
        assert!(compiled.ops.contains(&Op::LoadLocal(SLOT_Y)));
    }

    #[test]
    fn local_count_tracks_declarations() {
        let compiled = compile_src("let a = 1\nlet b = 2\n{ let c = 3 }");
        assert_eq!(compiled.local_count, RESERVED_SLOTS + 3);
    }

    #[test]
    fn variable_aliases_share_a_slot() {
        let compiled = compile_src("v.n = 1\nreturn variable.n");
        assert!(compiled.ops.contains(&Op::LoadLocal(SLOT_VARIABLE)));
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::SetField(_))));
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::GetField(_))));
        assert!(!compiled.ops.iter().any(|op| matches!(op, Op::LoadLocal(s) if *s > SLOT_VARIABLE)));
    }

    #[test]
    fn channel_names_are_predefined() {
        let compiled = compile_src("return { r: 1, g: 0, b: 0 }");
        assert!(compiled.ops.contains(&Op::InitField(NAME_R)));
        assert!(compiled.ops.contains(&Op::InitField(NAME_G)));
        assert!(compiled.ops.contains(&Op::InitField(NAME_B)));
    }

    #[test]
    fn math_call_compiles_to_builtin() {
        let compiled = compile_src("return math.floor(x / 8)");
        assert!(compiled.ops.contains(&Op::Call(Builtin::Math(MathFn::Floor), 1)));
    }

    #[test]
    fn query_alias_compiles() {
        let compiled = compile_src("return q.noise(x, y) + query.noise(y, x)");
        let calls = compiled.ops.iter().filter(|op| matches!(op, Op::Call(Builtin::Query(_), 2))).count();
        assert_eq!(calls, 2);
    }

    #[test]
    fn math_pi_is_a_constant() {
        let compiled = compile_src("return math.pi");
        assert!(compiled.constants.contains(&std::f64::consts::PI));
    }

    #[test]
    fn unknown_math_member_fails_at_runtime() {
        let compiled = compile_src("return math.explode(1)");
        assert!(compiled.ops.contains(&Op::Fail(0)));
        assert_eq!(compiled.messages[0], "math.explode is not a function");
    }

    #[test]
    fn calling_a_constant_fails_at_runtime() {
        let compiled = compile_src("return math.pi()");
        assert_eq!(compiled.messages[0], "math.pi is not a function");
    }

    #[test]
    fn unknown_math_member_reads_undefined() {
        let compiled = compile_src("return math.tau");
        assert!(compiled.ops.contains(&Op::PushUndefined));
    }

    #[test]
    fn logical_ops_use_keep_jumps() {
        let compiled = compile_src("return x && y || 1");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::JumpIfFalseKeep(_))));
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::JumpIfTrueKeep(_))));
    }

    #[test]
    fn while_loop_jumps_backward() {
        let compiled = compile_src("let i = 0\nwhile (i < 3) i++\nreturn i");
        let start = compiled.ops.iter().position(|op| matches!(op, Op::LoadLocal(3))).unwrap();
        assert!(compiled.ops.iter().any(|op| *op == Op::Jump(start as u16)));
    }

    #[test]
    fn undeclared_name_is_error() {
        let errs = compile_errs("return height");
        assert_eq!(errs[0].kind, ErrorKind::Name);
        assert!(errs[0].message.contains("'height' is not defined"));
    }

    #[test]
    fn assignment_to_undeclared_is_error() {
        let errs = compile_errs("height = 3");
        assert!(errs[0].message.contains("not defined"));
    }

    #[test]
    fn const_reassignment_is_error() {
        let errs = compile_errs("const a = 1\na += 2");
        assert!(errs[0].message.contains("Assignment to constant variable 'a'"));
    }

    #[test]
    fn variable_namespace_cannot_be_rebound() {
        let errs = compile_errs("v = 1");
        assert!(errs[0].message.contains("constant"));
    }

    #[test]
    fn namespace_members_are_read_only() {
        let errs = compile_errs("math.pi = 3");
        assert!(errs[0].message.contains("read-only"));
        let errs = compile_errs("q.noise = 3");
        assert!(errs[0].message.contains("'q' is read-only"));
    }

    #[test]
    fn namespace_is_not_a_value() {
        let errs = compile_errs("let m = math");
        assert!(errs[0].message.contains("namespace"));
    }

    #[test]
    fn function_member_must_be_called() {
        let errs = compile_errs("let f = math.floor");
        assert!(errs[0].message.contains("must be called"));
    }

    #[test]
    fn only_namespace_members_are_callable() {
        let errs = compile_errs("v.f(1)");
        assert!(errs[0].message.contains("Only math"));
    }

    #[test]
    fn redeclaring_injected_binding_is_error() {
        let errs = compile_errs("let x = 1");
        assert!(errs[0].message.contains("already been declared"));
    }

    #[test]
    fn shadowing_in_nested_block_is_allowed() {
        let compiled = compile_src("{ let x = 1\n let math = 2 }\nreturn x");
        assert!(compiled.ops.contains(&Op::LoadLocal(SLOT_X)));
    }

    #[test]
    fn for_loop_variable_is_scoped_to_loop() {
        let errs = compile_errs("for (let i = 0; i < 2; i++) {}\nreturn i");
        assert!(errs[0].message.contains("'i' is not defined"));
    }

    #[test]
    fn errors_are_collected_across_statements() {
        let errs = compile_errs("let a = nope\nlet b = also_nope\nreturn 1");
        assert_eq!(errs.len(), 2);
    }
}
