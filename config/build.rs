fn main() {
    println!("cargo:rerun-if-env-changed=RPSENSE_ENV");

    let env = match option_env!("RPSENSE_ENV") {
        None => "development",
        Some(env) => env,
    };
    println!("cargo:warning=Using Env {}", env);

    println!("cargo:rustc-cfg=feature=\"env_{}\"", env.to_lowercase());
}
