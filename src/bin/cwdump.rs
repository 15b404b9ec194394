use cwasm::cli::command;
use structopt::StructOpt;

fn main() {
    command::terminal_init();
    command::dump(command::SubcommandDump::from_args());
}
