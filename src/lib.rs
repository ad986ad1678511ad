//! OpenCL C compute-kernel translator for Vulkan.
//!
//! The central structure of the crate is [`Module`]: a typed, single static
//! assignment representation of a set of compute kernels, as produced by the
//! earlier passes of the offline compiler. The [SPIR-V back end][back::spv]
//! lowers a module into a Vulkan-consumable shader binary together with a
//! descriptor map describing how every kernel argument is bound.
//!
//! To improve performance and reduce memory usage, most structures are stored
//! in an [`Arena`], and can be retrieved using the corresponding [`Handle`].
#![allow(clippy::new_without_default)]

mod arena;
pub mod back;
pub mod proc;

pub use crate::arena::{Arena, Handle};

use std::{
    collections::{HashMap, HashSet},
    hash::BuildHasherDefault,
};

/// Hash map that is faster but not resilient to DoS attacks.
pub type FastHashMap<K, T> = HashMap<K, T, BuildHasherDefault<fxhash::FxHasher>>;
/// Hash set that is faster but not resilient to DoS attacks.
pub type FastHashSet<K> = HashSet<K, BuildHasherDefault<fxhash::FxHasher>>;

/// Number of bytes.
pub type Bytes = u8;

/// Index of a basic block inside its function.
pub type BlockIndex = u32;

/// Number of components in a vector.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub enum VectorSize {
    /// 2D vector
    Bi = 2,
    /// 3D vector
    Tri = 3,
    /// 4D vector
    Quad = 4,
}

/// Primitive type for a scalar.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub enum ScalarKind {
    /// Signed integer type.
    Sint,
    /// Unsigned integer type.
    Uint,
    /// Floating point type.
    Float,
    /// Boolean type.
    Bool,
}

/// The OpenCL address space a pointer refers to.
#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub enum AddressSpace {
    /// Function-local allocation.
    Function,
    /// Module-scope private memory.
    Private,
    /// The `global` address space.
    Global,
    /// The `constant` address space.
    Constant,
    /// The `local` (work-group shared) address space.
    Local,
}

/// The number of dimensions an image has.
#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub enum ImageDimension {
    /// 2D image
    D2,
    /// 3D image
    D3,
}

/// How a kernel is allowed to access an image argument.
#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub enum ImageAccess {
    /// `read_only` image, sampled by the kernel.
    ReadOnly,
    /// `write_only` image, stored to by the kernel.
    WriteOnly,
}

/// A data type declared in the module.
#[derive(Debug, PartialEq)]
pub struct Type {
    /// The name of the type, if any.
    pub name: Option<String>,
    /// Inner structure that depends on the kind of the type.
    pub inner: TypeInner,
}

/// Enum with additional information, depending on the kind of type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeInner {
    /// Number of integral or floating-point kind. Booleans are scalars of
    /// [`ScalarKind::Bool`] with width 1.
    Scalar { kind: ScalarKind, width: Bytes },
    /// Vector of numbers.
    Vector {
        size: VectorSize,
        kind: ScalarKind,
        width: Bytes,
    },
    /// Fixed-size list of elements.
    Array { base: Handle<Type>, length: u32 },
    /// User-defined structure.
    Struct { members: Vec<Handle<Type>> },
    /// Pointer to a value in a given address space.
    Pointer {
        base: Handle<Type>,
        space: AddressSpace,
    },
    /// 2D or 3D image of 32-bit float texels.
    Image {
        dim: ImageDimension,
        access: ImageAccess,
    },
    /// Can be used to sample values from images.
    Sampler,
}

/// Constant value.
#[derive(Debug, PartialEq)]
pub struct Constant {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub inner: ConstantInner,
}

/// Additional information, dependent on the kind of constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantInner {
    Bool(bool),
    Sint(i64),
    Uint(u64),
    Float(f64),
    /// All-zero value of a structured type.
    Null,
    /// Undefined value.
    Undef,
    Composite(Vec<Handle<Constant>>),
}

/// Variable defined at module level.
#[derive(Debug)]
pub struct GlobalVariable {
    /// Name of the variable, if any.
    pub name: Option<String>,
    /// The address space the variable lives in.
    pub space: AddressSpace,
    /// The type of the value the variable holds.
    pub ty: Handle<Type>,
    /// Initial value of the variable.
    pub init: Option<Handle<Constant>>,
}

/// Operation that can be applied on two values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    ExclusiveOr,
    InclusiveOr,
    ShiftLeft,
    ShiftRightLogical,
    ShiftRightArithmetic,
}

/// Predicate of a comparison instruction.
///
/// Integer predicates carry their signedness; floating-point predicates come
/// in ordered and unordered flavors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Comparison {
    Equal,
    NotEqual,
    UnsignedGreater,
    UnsignedGreaterEqual,
    UnsignedLess,
    UnsignedLessEqual,
    SignedGreater,
    SignedGreaterEqual,
    SignedLess,
    SignedLessEqual,
    FloatOrdEqual,
    FloatOrdNotEqual,
    FloatOrdGreater,
    FloatOrdGreaterEqual,
    FloatOrdLess,
    FloatOrdLessEqual,
    FloatUnordEqual,
    FloatUnordNotEqual,
    FloatUnordGreater,
    FloatUnordGreaterEqual,
    FloatUnordLess,
    FloatUnordLessEqual,
}

/// Kind of a conversion instruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CastKind {
    Trunc,
    ZeroExtend,
    SignExtend,
    FloatTrunc,
    FloatExtend,
    FloatToUint,
    FloatToSint,
    UintToFloat,
    SintToFloat,
    Bitcast,
}

/// Kind of an atomic read-modify-write instruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AtomicOperator {
    Add,
    Subtract,
    Exchange,
    UnsignedMin,
    UnsignedMax,
    SignedMin,
    SignedMax,
    And,
    InclusiveOr,
    ExclusiveOr,
    Increment,
    Decrement,
}

/// Origin of a function to call.
#[derive(Clone, Debug, PartialEq)]
pub enum FunctionOrigin {
    /// A function defined in this module.
    Local(Handle<Function>),
    /// An OpenCL builtin, referenced by name.
    External(String),
}

/// A single static assignment value: either a leaf (argument, global,
/// constant) or the result of an instruction.
///
/// Instruction values appear in exactly one basic-block body, in program
/// order; leaf values appear in none.
#[derive(Clone, Debug)]
pub enum Value {
    /// Reference a function argument, by its index.
    Argument(u32),
    /// Reference a module-scope variable.
    Global(Handle<GlobalVariable>),
    /// Constant value.
    Constant(Handle<Constant>),
    /// Stack allocation; yields a pointer in the function address space.
    Alloca { ty: Handle<Type> },
    /// Apply a binary operator.
    Binary {
        op: BinaryOperator,
        left: Handle<Value>,
        right: Handle<Value>,
    },
    /// Compare two values, yielding a boolean.
    Compare {
        op: Comparison,
        left: Handle<Value>,
        right: Handle<Value>,
    },
    /// Convert a value to another type.
    Cast {
        kind: CastKind,
        value: Handle<Value>,
        to: Handle<Type>,
    },
    /// Choose between two values based on a condition.
    Select {
        condition: Handle<Value>,
        accept: Handle<Value>,
        reject: Handle<Value>,
    },
    /// Build a composite out of element values. Produced by the earlier
    /// passes when a vector or aggregate is assembled piecewise.
    Compose {
        ty: Handle<Type>,
        components: Vec<Handle<Value>>,
    },
    /// Compute the address of a subobject (`getelementptr`).
    GetPtr {
        base: Handle<Value>,
        indices: Vec<Handle<Value>>,
    },
    /// Load a value indirectly.
    Load { pointer: Handle<Value> },
    /// Store a value at an address. Yields no result.
    Store {
        pointer: Handle<Value>,
        value: Handle<Value>,
    },
    /// Read one lane of a vector.
    ExtractElement {
        vector: Handle<Value>,
        index: Handle<Value>,
    },
    /// Replace one lane of a vector.
    InsertElement {
        vector: Handle<Value>,
        component: Handle<Value>,
        index: Handle<Value>,
    },
    /// Build a vector out of lanes of two others.
    Shuffle {
        first: Handle<Value>,
        second: Handle<Value>,
        pattern: Vec<u32>,
    },
    /// Read a member of an aggregate.
    ExtractValue {
        composite: Handle<Value>,
        indices: Vec<u32>,
    },
    /// Replace a member of an aggregate.
    InsertValue {
        composite: Handle<Value>,
        object: Handle<Value>,
        indices: Vec<u32>,
    },
    /// Atomic read-modify-write. `value` is `None` for increment/decrement.
    Atomic {
        op: AtomicOperator,
        pointer: Handle<Value>,
        value: Option<Handle<Value>>,
    },
    /// SSA merge of values flowing in from predecessor blocks.
    Phi {
        ty: Handle<Type>,
        sources: Vec<(Handle<Value>, BlockIndex)>,
    },
    /// Call another function or a named builtin.
    Call {
        origin: FunctionOrigin,
        arguments: Vec<Handle<Value>>,
    },
}

/// How a basic block transfers control.
#[derive(Clone, Debug)]
pub enum Terminator {
    /// Jump to another block unconditionally.
    Branch { target: BlockIndex },
    /// Jump to one of two blocks based on a boolean condition.
    BranchConditional {
        condition: Handle<Value>,
        accept: BlockIndex,
        reject: BlockIndex,
    },
    /// Return from the function (possibly with a value).
    Return { value: Option<Handle<Value>> },
    /// Multi-way branch. Not supported by the SPIR-V back end.
    Switch {
        selector: Handle<Value>,
        default: BlockIndex,
        cases: Vec<(i32, BlockIndex)>,
    },
}

/// A straight-line run of instructions with a single entry and a single
/// terminator.
#[derive(Debug)]
pub struct BasicBlock {
    /// Name of the block, if any.
    pub name: Option<String>,
    /// Instruction values, in program order.
    pub body: Vec<Handle<Value>>,
    /// How control leaves this block.
    pub terminator: Terminator,
}

/// A formal argument of a function.
#[derive(Debug)]
pub struct FunctionArgument {
    /// Name of the argument.
    pub name: String,
    /// The type of the argument.
    pub ty: Handle<Type>,
    /// Specialization-constant id controlling the element count, for
    /// pointer-to-local kernel arguments. Taken from the `kernel_arg_map`
    /// metadata of the source module.
    pub spec_id: Option<u32>,
}

/// Metadata carried by kernel entry points.
#[derive(Clone, Debug, Default)]
pub struct KernelData {
    /// The `reqd_work_group_size` attribute, if the kernel has one.
    pub work_group_size: Option<[u32; 3]>,
}

/// A function defined in the module.
///
/// Functions with [`kernel`](Function::kernel) metadata become `GLCompute`
/// entry points; all others are internal and may be called from kernels.
#[derive(Debug)]
pub struct Function {
    /// Name of the function.
    pub name: String,
    /// The formal arguments of this function.
    pub arguments: Vec<FunctionArgument>,
    /// The return type of this function, if any.
    pub result: Option<Handle<Type>>,
    /// Kernel metadata; `Some` exactly for entry points.
    pub kernel: Option<KernelData>,
    /// Values used inside this function.
    pub values: Arena<Value>,
    /// Basic blocks comprising the body. Block 0 is the entry block.
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    /// Returns `true` if this function is a kernel entry point.
    pub fn is_kernel(&self) -> bool {
        self.kernel.is_some()
    }
}

/// Compute module.
///
/// A module is a set of constants, global variables and functions, as well as
/// the types required to define them. Functions carrying kernel metadata are
/// the entry points of the translated shader.
#[derive(Debug, Default)]
pub struct Module {
    /// Storage for the types defined in this module.
    pub types: Arena<Type>,
    /// Storage for the constants defined in this module.
    pub constants: Arena<Constant>,
    /// Storage for the global variables defined in this module.
    pub global_variables: Arena<GlobalVariable>,
    /// Storage for the functions defined in this module.
    pub functions: Arena<Function>,
}

impl Module {
    /// Create a module with no members.
    pub fn new() -> Self {
        Self::default()
    }
}
