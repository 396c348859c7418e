use std::collections::HashMap;

/// Data shared between the trigger, the check and the actions of a pass.
///
/// Every key is exposed to the steps as an `AUTOCC_`-prefixed environment variable.
pub type Context = HashMap<&'static str, String>;
