use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::RngCore;

use super::builtins::{js_pow, Builtin};
use super::compiler::{CompiledProgram, Op, SLOT_VARIABLE, SLOT_X, SLOT_Y, VARIABLE_FIELDS};
use crate::noise::ValueNoise;

/// Maximum stack depth to prevent runaway programs.
const MAX_STACK: usize = 256;

/// Runtime value on the VM stack.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Objects are shared by reference, like the language they mimic.
    Object(Rc<RefCell<Object>>),
}

impl Value {
    /// Numeric conversion: `undefined` and objects are NaN, `null` is 0.
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined | Self::Object(_) => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Object(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Object(_) => "object",
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined | Self::Null, Self::Undefined | Self::Null) => true,
            (Self::Undefined | Self::Null, _) | (_, Self::Undefined | Self::Null) => false,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Object(_), _) | (_, Self::Object(_)) => false,
            (a, b) => a.to_number() == b.to_number(),
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A script object: an ordered list of (interned name, value) fields.
#[derive(Debug, Default)]
pub struct Object {
    fields: Vec<(u16, Value)>,
}

impl Object {
    pub fn get(&self, name: u16) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: u16, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Error raised while executing a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Pool size below which a run never sweeps.
const MIN_SWEEP: usize = 1024;

/// Object storage recycled between runs.
///
/// Objects below `live` may be in use; the rest are empty and free. When a
/// run fills the pool it sweeps instead of growing, so a loop that keeps
/// dropping objects reuses the same few slots.
#[derive(Default)]
struct Heap {
    objects: Vec<Rc<RefCell<Object>>>,
    live: usize,
    sweep_at: usize,
}

impl Heap {
    fn alloc(&mut self) -> Rc<RefCell<Object>> {
        if self.live == self.objects.len() && self.live >= self.sweep_at.max(MIN_SWEEP) {
            self.sweep();
        }
        let obj = match self.objects.get(self.live) {
            Some(obj) if Rc::strong_count(obj) == 1 => Rc::clone(obj),
            _ => {
                let fresh = Rc::new(RefCell::new(Object::default()));
                if self.live < self.objects.len() {
                    self.objects[self.live] = Rc::clone(&fresh);
                } else {
                    self.objects.push(Rc::clone(&fresh));
                }
                fresh
            }
        };
        self.live += 1;
        obj
    }

    /// Empty every object of the previous run. This also breaks reference
    /// cycles such as `v.self = v`.
    fn recycle(&mut self) {
        for obj in self.objects.iter().take(self.live) {
            obj.borrow_mut().fields.clear();
        }
        self.live = 0;
    }

    /// Move reachable objects to the front and empty the rest.
    fn sweep(&mut self) {
        let reachable = self.mark();
        let mut kept = 0;
        for (i, keep) in reachable.into_iter().enumerate() {
            if keep {
                self.objects.swap(kept, i);
                kept += 1;
            }
        }
        for obj in self.objects.iter().skip(kept) {
            if let Ok(mut obj) = obj.try_borrow_mut() {
                obj.fields.clear();
            }
        }
        tracing::trace!(kept, pool = self.objects.len(), "heap swept");
        self.live = kept;
        self.sweep_at = kept * 2;
    }

    /// Which objects can be reached from a reference held outside the pool:
    /// the VM stack, its locals or the caller.
    fn mark(&self) -> Vec<bool> {
        let index: HashMap<*const RefCell<Object>, usize> = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, obj)| (Rc::as_ptr(obj), i))
            .collect();
        let pooled = |value: &Value| match value {
            Value::Object(obj) => index.get(&Rc::as_ptr(obj)).copied(),
            _ => None,
        };

        // References from other pooled objects, so the rest are external.
        let mut internal = vec![0usize; self.objects.len()];
        for obj in &self.objects {
            let Ok(obj) = obj.try_borrow() else { continue };
            for i in obj.fields.iter().filter_map(|(_, v)| pooled(v)) {
                internal[i] += 1;
            }
        }

        let mut reachable: Vec<bool> = self
            .objects
            .iter()
            .zip(&internal)
            .map(|(obj, internal)| Rc::strong_count(obj) > internal + 1)
            .collect();
        let mut pending: Vec<usize> = (0..reachable.len()).filter(|&i| reachable[i]).collect();
        while let Some(i) = pending.pop() {
            let Ok(obj) = self.objects[i].try_borrow() else { continue };
            for child in obj.fields.iter().filter_map(|(_, v)| pooled(v)) {
                if !reachable[child] {
                    reachable[child] = true;
                    pending.push(child);
                }
            }
        }
        reachable
    }
}

impl Drop for Heap {
    /// Objects still held by the caller keep their fields; unreachable
    /// cycles are broken so they are freed with the pool.
    fn drop(&mut self) {
        for (obj, keep) in self.objects.iter().zip(self.mark()) {
            if !keep {
                if let Ok(mut obj) = obj.try_borrow_mut() {
                    obj.fields.clear();
                }
            }
        }
    }
}

/// Reusable VM working memory. Create once per batch, reuse across pixels
/// to avoid heap allocations in the per-pixel hot path.
#[derive(Default)]
pub struct VmBuffers {
    stack: Vec<Value>,
    locals: Vec<Value>,
    args: Vec<f64>,
    heap: Heap,
}

impl VmBuffers {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(64),
            locals: Vec::new(),
            args: Vec::with_capacity(8),
            heap: Heap::default(),
        }
    }

    /// Clear and resize for a new execution. Reuses existing heap allocations.
    fn reset(&mut self, local_count: usize) {
        self.stack.clear();
        self.locals.clear();
        self.heap.recycle();
        self.locals.resize(local_count, Value::Undefined);
    }
}

/// Runtime context provided per-pixel.
pub struct VmContext<'a> {
    pub x: f64,
    pub y: f64,
    pub noise: &'a ValueNoise,
    /// Source for `math.random` and the dice builtins.
    pub rng: &'a mut dyn RngCore,
}

/// Execute a compiled program for one pixel.
///
/// For batch execution, prefer `execute_reuse` with a shared `VmBuffers`
/// to avoid per-pixel heap allocations.
pub fn execute(program: &CompiledProgram, ctx: &mut VmContext<'_>) -> Result<Value, RuntimeError> {
    let mut buffers = VmBuffers::new();
    execute_reuse(program, ctx, &mut buffers)
}

/// Execute a compiled program reusing pre-allocated buffers.
///
/// Objects reachable from the returned value are recycled by the next call
/// with the same buffers; read the result before running again.
#[allow(clippy::too_many_lines)]
pub fn execute_reuse(
    program: &CompiledProgram,
    ctx: &mut VmContext<'_>,
    buffers: &mut VmBuffers,
) -> Result<Value, RuntimeError> {
    buffers.reset(program.local_count as usize);
    let VmBuffers { stack, locals, args, heap } = buffers;

    let variable = heap.alloc();
    {
        let mut obj = variable.borrow_mut();
        let [originx, originz, worldx, worldz] = VARIABLE_FIELDS;
        obj.set(originx, Value::Number(ctx.x));
        obj.set(originz, Value::Number(ctx.y));
        obj.set(worldx, Value::Number(ctx.x));
        obj.set(worldz, Value::Number(ctx.y));
    }
    store(locals, SLOT_X, Value::Number(ctx.x));
    store(locals, SLOT_Y, Value::Number(ctx.y));
    store(locals, SLOT_VARIABLE, Value::Object(variable));

    let ops = &program.ops;
    let consts = &program.constants;
    let mut ip: usize = 0;

    while ip < ops.len() {
        if stack.len() >= MAX_STACK {
            return Err(RuntimeError::new(format!("Stack overflow (max depth {MAX_STACK})")));
        }

        let op = ops[ip];
        ip += 1;

        match op {
            Op::PushConst(idx) => {
                let val = consts.get(idx as usize).copied().unwrap_or(f64::NAN);
                stack.push(Value::Number(val));
            }
            Op::PushUndefined => stack.push(Value::Undefined),
            Op::PushNull => stack.push(Value::Null),
            Op::PushTrue => stack.push(Value::Bool(true)),
            Op::PushFalse => stack.push(Value::Bool(false)),
            Op::LoadLocal(idx) => {
                let val = locals.get(idx as usize).cloned().unwrap_or_default();
                stack.push(val);
            }
            Op::StoreLocal(idx) => {
                let val = pop(stack);
                store(locals, idx, val);
            }
            Op::Pop => {
                stack.pop();
            }
            Op::Dup => {
                let top = stack.last().cloned().unwrap_or_default();
                stack.push(top);
            }

            // Objects
            Op::NewObject => stack.push(Value::Object(heap.alloc())),
            Op::InitField(id) => {
                let val = pop(stack);
                if let Some(Value::Object(obj)) = stack.last() {
                    obj.borrow_mut().set(id, val);
                }
            }
            Op::GetField(id) => {
                let target = pop(stack);
                let val = match &target {
                    Value::Object(obj) => obj.borrow().get(id).cloned().unwrap_or_default(),
                    Value::Undefined | Value::Null => {
                        return Err(RuntimeError::new(format!(
                            "Cannot read properties of {} (reading '{}')",
                            target.type_name(),
                            program.name(id),
                        )));
                    }
                    Value::Bool(_) | Value::Number(_) => Value::Undefined,
                };
                stack.push(val);
            }
            Op::SetField(id) => {
                let val = pop(stack);
                let target = pop(stack);
                match &target {
                    Value::Object(obj) => obj.borrow_mut().set(id, val),
                    Value::Undefined | Value::Null => {
                        return Err(RuntimeError::new(format!(
                            "Cannot set properties of {} (setting '{}')",
                            target.type_name(),
                            program.name(id),
                        )));
                    }
                    // Writes to primitives are dropped.
                    Value::Bool(_) | Value::Number(_) => {}
                }
            }

            // Arithmetic
            Op::Add => number_binop(stack, |a, b| a + b),
            Op::Sub => number_binop(stack, |a, b| a - b),
            Op::Mul => number_binop(stack, |a, b| a * b),
            Op::Div => number_binop(stack, |a, b| a / b),
            Op::Mod => number_binop(stack, |a, b| a % b),
            Op::Pow => number_binop(stack, js_pow),
            Op::Neg => number_unary(stack, |a| -a),
            Op::Plus => number_unary(stack, |a| a),

            // Comparison
            Op::Lt => number_cmp(stack, |a, b| a < b),
            Op::Gt => number_cmp(stack, |a, b| a > b),
            Op::Le => number_cmp(stack, |a, b| a <= b),
            Op::Ge => number_cmp(stack, |a, b| a >= b),
            Op::Eq => value_cmp(stack, Value::loose_eq),
            Op::Ne => value_cmp(stack, |a, b| !a.loose_eq(b)),
            Op::StrictEq => value_cmp(stack, Value::strict_eq),
            Op::StrictNe => value_cmp(stack, |a, b| !a.strict_eq(b)),

            // Logic
            Op::Not => {
                let val = pop(stack);
                stack.push(Value::Bool(!val.truthy()));
            }

            Op::Call(func, argc) => {
                let start = stack.len().saturating_sub(usize::from(argc));
                args.clear();
                args.extend(stack.drain(start..).map(|v| v.to_number()));
                let result = match func {
                    Builtin::Math(f) => f.eval(args, &mut *ctx.rng),
                    Builtin::Query(f) => f.eval(args, ctx.noise),
                };
                stack.push(Value::Number(result));
            }
            Op::Fail(idx) => {
                let message = program
                    .messages
                    .get(idx as usize)
                    .map_or("Runtime error", String::as_str);
                return Err(RuntimeError::new(message));
            }

            // Control flow
            Op::JumpIfFalse(target) => {
                if !pop(stack).truthy() {
                    ip = target as usize;
                }
            }
            Op::JumpIfFalseKeep(target) => {
                if stack.last().is_some_and(|v| !v.truthy()) {
                    ip = target as usize;
                } else {
                    stack.pop();
                }
            }
            Op::JumpIfTrueKeep(target) => {
                if stack.last().is_some_and(Value::truthy) {
                    ip = target as usize;
                } else {
                    stack.pop();
                }
            }
            Op::Jump(target) => {
                ip = target as usize;
            }

            Op::Return => {
                return Ok(pop(stack));
            }
        }
    }

    Ok(Value::Number(0.0))
}

fn pop(stack: &mut Vec<Value>) -> Value {
    stack.pop().unwrap_or_default()
}

fn store(locals: &mut [Value], idx: u16, val: Value) {
    if let Some(slot) = locals.get_mut(idx as usize) {
        *slot = val;
    }
}

fn number_binop(stack: &mut Vec<Value>, op: impl FnOnce(f64, f64) -> f64) {
    let b = pop(stack).to_number();
    let a = pop(stack).to_number();
    stack.push(Value::Number(op(a, b)));
}

fn number_unary(stack: &mut Vec<Value>, op: impl FnOnce(f64) -> f64) {
    let a = pop(stack).to_number();
    stack.push(Value::Number(op(a)));
}

fn number_cmp(stack: &mut Vec<Value>, op: impl FnOnce(f64, f64) -> bool) {
    let b = pop(stack).to_number();
    let a = pop(stack).to_number();
    stack.push(Value::Bool(op(a, b)));
}

fn value_cmp(stack: &mut Vec<Value>, op: impl FnOnce(&Value, &Value) -> bool) {
    let b = pop(stack);
    let a = pop(stack);
    stack.push(Value::Bool(op(&a, &b)));
}
