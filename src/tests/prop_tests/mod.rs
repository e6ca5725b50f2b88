mod generator;
use generator::*;

use proptest::prelude::*;

pub mod codec;

pub mod fixed_point;
