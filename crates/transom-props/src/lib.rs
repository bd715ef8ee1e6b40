//! Prop model for embedded components: typed definitions, the
//! normalization pipeline, query-string serialization, and the wire form
//! used to hand props to the child context.

pub mod definition;
pub mod function;
pub mod normalize;
pub mod query;
pub mod value;
pub mod wire;

pub use definition::{
    ChildDecorator, NormalizeContext, PropDecorator, PropDefinition, PropSchema, PropSupplier,
    PropValidator, QueryParam, QueryValueFn, Serialization,
};
pub use function::{InstanceGuard, PropFunction};
pub use normalize::{check_required, normalize_child_props, normalize_props};
pub use query::{dotify, extend_query, props_to_query};
pub use value::{PropBag, PropKind, PropValue};
pub use wire::{
    decode_props_from_parent, dispatch_prop_call, encode_props_for_child, RemoteCaller,
    FUNCTION_MARKER,
};
