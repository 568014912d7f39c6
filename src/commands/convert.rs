use super::{IoArgs, finish, read_input};
use gpx2footprint::{Mode, convert};
use std::error::Error;

pub fn convert_command(args: &IoArgs) -> Result<(), Box<dyn Error>> {
    let input = read_input(args.input.as_deref())?;
    let conversion = convert(&input, Mode::Plain)?;
    finish(args, &conversion)
}
