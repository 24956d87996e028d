pub use oscdeck_protocol::{
    Action, ClientCommand, ErrorCode, OscTarget, ParamValue, Preset, PresetBank, Query,
    ServerMessage,
};
