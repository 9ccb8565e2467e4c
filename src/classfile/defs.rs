//! Class-file constants

/// Header of every class file
pub const MAGIC: u32 = 0xCAFEBABE;

pub const STATIC_INITIALIZER_METHOD_NAME: &str = "<clinit>";

/// Access flags read by the optimizer
pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
}

/// Attribute names the optimizer inspects or drops
pub mod attribute_names {
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";

    pub const NEST_HOST: &str = "NestHost";
    pub const NEST_MEMBERS: &str = "NestMembers";
    pub const RECORD: &str = "Record";
    pub const PERMITTED_SUBCLASSES: &str = "PermittedSubclasses";
    pub const MODULE: &str = "Module";

    /// Class attributes whose meaning is lost below the version that introduced them
    pub const VERSION_BOUND: [&str; 5] = [NEST_HOST, NEST_MEMBERS, RECORD, PERMITTED_SUBCLASSES, MODULE];

    /// `Code` sub-attributes keyed to bytecode offsets, invalid once a body is rewritten
    pub const OFFSET_DEPENDENT: [&str; 4] =
        [STACK_MAP_TABLE, LINE_NUMBER_TABLE, LOCAL_VARIABLE_TABLE, LOCAL_VARIABLE_TYPE_TABLE];
}
