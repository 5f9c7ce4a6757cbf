pub use anyhow::{ensure, format_err, Context as _, Result};
pub use bbox::{prelude::*, HW, XYWH};
pub use indexmap::IndexMap;
pub use itertools::{izip, Itertools as _};
pub use label::{ClassId, TrueClass};
pub use log::debug;
pub use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{borrow::Borrow, collections::HashMap, iter, path::Path};
