use lipton::driver;
use lipton_utils::LiptonResult;

fn main() -> LiptonResult<()> {
    driver::run_lipton()
}
