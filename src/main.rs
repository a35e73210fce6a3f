use pl0::compiler;
use std::env;

fn main() {
    env_logger::init();

    let command = compiler::Command::new();

    match command.run(env::args()) {
        Ok(output) => {
            print!("{}", output)
        }
        Err(err) => panic!("{}", err),
    };
}
