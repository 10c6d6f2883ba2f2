mod check;
mod completions;
mod helpers;
mod repos_and_pkg;
