use duct::cmd;
use rand::distributions::{Alphanumeric, DistString};
use std::{error::Error, fs};

pub fn get_random_id() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
}

/// Create a unique directory under `test_directories` and return its path.
pub fn create_test_directory() -> Result<String, Box<dyn Error>> {
    let directory = format!("test_directories/{}", get_random_id());
    fs::create_dir_all(&directory)?;

    Ok(fs::canonicalize(directory)?.to_string_lossy().to_string())
}

/// Create a bare repository with one commit on master.
pub fn create_remote_repository(remote: &str) -> Result<(), Box<dyn Error>> {
    let seed = format!("{remote}-seed");

    fs::create_dir_all(remote)?;
    cmd!("git", "init", "--bare").dir(remote).read()?;
    cmd!("git", "symbolic-ref", "HEAD", "refs/heads/master")
        .dir(remote)
        .read()?;
    cmd!("git", "clone", remote, &seed).read()?;
    cmd!("git", "checkout", "-B", "master").dir(&seed).read()?;
    fs::write(format!("{seed}/1"), "1")?;
    cmd!("git", "add", "-A").dir(&seed).read()?;
    commit(&seed, "1")?;
    cmd!("git", "push", "origin", "master").dir(&seed).read()?;
    fs::remove_dir_all(seed)?;

    Ok(())
}

/// Push a new commit, creating the given file on the given branch.
pub fn push_commit(remote: &str, branch: &str, file: &str) -> Result<(), Box<dyn Error>> {
    let other = format!("{remote}-other-{}", get_random_id());

    cmd!("git", "clone", remote, &other).read()?;
    cmd!("git", "checkout", "-B", branch).dir(&other).read()?;
    fs::write(format!("{other}/{file}"), file)?;
    cmd!("git", "add", "-A").dir(&other).read()?;
    commit(&other, file)?;
    cmd!("git", "push", "origin", branch).dir(&other).read()?;
    fs::remove_dir_all(other)?;

    Ok(())
}

pub fn commit(local: &str, message: &str) -> Result<(), Box<dyn Error>> {
    cmd!(
        "git",
        "-c",
        "user.name=autocc",
        "-c",
        "user.email=autocc@example.com",
        "commit",
        "-m",
        message
    )
    .dir(local)
    .read()?;

    Ok(())
}

pub fn get_last_commit(path: &str, reference: &str) -> Result<String, Box<dyn Error>> {
    let commit_sha = cmd!("git", "rev-parse", reference).dir(path).read()?;

    Ok(commit_sha)
}

pub fn cleanup_directory(directory: &str) -> Result<(), Box<dyn Error>> {
    fs::remove_dir_all(directory)?;

    Ok(())
}
