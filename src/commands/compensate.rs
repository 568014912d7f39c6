use super::{IoArgs, finish, read_input};
use gpx2footprint::{Mode, convert};
use std::error::Error;
use tracing::info;

pub fn compensate_command(max_distance_m: f64, args: &IoArgs) -> Result<(), Box<dyn Error>> {
    let input = read_input(args.input.as_deref())?;

    info!(max_distance_m, "compensating gaps");
    let conversion = convert(&input, Mode::Compensated { max_distance_m })?;
    finish(args, &conversion)
}
